use anyhow::Result;

use crate::concurrency::transaction::{IndexWriteRecord, IsolationLevel, WType};
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};

use super::plans::DeletePlanNode;
use super::{resolve_table, Executor, ExecutorContext, TableMeta};

/// Tombstones every row its child produces, under an EXCLUSIVE lock
/// (upgrading a SHARED one the scan may have left behind). Index
/// entries are dropped alongside and recorded on the index write set.
pub struct DeleteExecutor {
    ctx: ExecutorContext,
    plan: DeletePlanNode,
    child: Box<dyn Executor>,
    meta: TableMeta,
}

impl DeleteExecutor {
    pub fn new(
        ctx: ExecutorContext,
        plan: DeletePlanNode,
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
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        let Some((tuple, rid)) = self.child.next()? else {
            return Ok(None);
        };

        self.ctx.acquire_exclusive(rid)?;

        self.meta
            .table
            .mark_delete(rid, self.plan.table_oid, Some(&self.ctx.txn))?;

        if self.ctx.txn.isolation_level() == IsolationLevel::ReadUncommitted {
            self.ctx.lock_manager.unlock(&self.ctx.txn, rid)?;
        }

        for index_meta in self.meta.indexes.iter() {
            let key = tuple.key_from_tuple(&index_meta.key_attrs)?;
            index_meta.index.delete_entry(&key, rid)?;
            self.ctx.txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: self.plan.table_oid,
                index_oid: index_meta.oid,
                wtype: WType::Delete,
                tuple: tuple.clone(),
            });
        }

        Ok(Some((tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
