use anyhow::Result;

use crate::concurrency::transaction::{IndexWriteRecord, IsolationLevel, WType};
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::plans::{UpdateInfo, UpdatePlanNode};
use super::{resolve_table, Executor, ExecutorContext, TableMeta};

/// Rewrites every row its child produces by applying the plan's
/// per-column `{Add, Set}` updates, under an EXCLUSIVE lock. Each index
/// sees a delete of the old key image followed by an insert of the new
/// one, and both moves land on the index write set.
pub struct UpdateExecutor {
    ctx: ExecutorContext,
    plan: UpdatePlanNode,
    child: Box<dyn Executor>,
    meta: TableMeta,
}

impl UpdateExecutor {
    pub fn new(
        ctx: ExecutorContext,
        plan: UpdatePlanNode,
        child: Box<dyn Executor>,
    ) -> Result<Self> {
        let meta = resolve_table(&ctx, plan.table_oid)?;
        Ok(Self {
            ctx,
            plan,
            child,
            meta,
        })
    }

    fn generate_updated_tuple(&self, src_tuple: &Tuple) -> Result<Tuple> {
        let mut values = Vec::with_capacity(self.meta.schema.fields.len());
        for (idx, old) in src_tuple.values().iter().enumerate() {
            let value = match self.plan.update_attrs.get(&idx) {
                None => old.clone(),
                Some(UpdateInfo::Add(delta)) => old.add(&Value::Int(*delta))?,
                Some(UpdateInfo::Set(value)) => value.clone(),
            };
            values.push(value);
        }
        Ok(Tuple::new(values))
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        let Some((tuple, rid)) = self.child.next()? else {
            return Ok(None);
        };

        let new_tuple = self.generate_updated_tuple(&tuple)?;

        self.ctx.acquire_exclusive(rid)?;

        self.meta
            .table
            .update_tuple(&new_tuple, rid, self.plan.table_oid, Some(&self.ctx.txn))?;

        if self.ctx.txn.isolation_level() == IsolationLevel::ReadUncommitted {
            self.ctx.lock_manager.unlock(&self.ctx.txn, rid)?;
        }

        for index_meta in self.meta.indexes.iter() {
            let old_key = tuple.key_from_tuple(&index_meta.key_attrs)?;
            let new_key = new_tuple.key_from_tuple(&index_meta.key_attrs)?;
            index_meta.index.delete_entry(&old_key, rid)?;
            index_meta.index.insert_entry(&new_key, rid)?;

            self.ctx.txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: self.plan.table_oid,
                index_oid: index_meta.oid,
                wtype: WType::Delete,
                tuple: tuple.clone(),
            });
            self.ctx.txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: self.plan.table_oid,
                index_oid: index_meta.oid,
                wtype: WType::Insert,
                tuple: new_tuple.clone(),
            });
        }

        Ok(Some((new_tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
