use anyhow::Result;

use crate::concurrency::transaction::{IndexWriteRecord, WType};
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};

use super::plans::InsertPlanNode;
use super::{resolve_table, Executor, ExecutorContext, TableMeta};

/// Feeds rows into the table heap, either from the plan's inline
/// literal rows or from a child subplan, and keeps every index on the
/// table in step.
pub struct InsertExecutor {
    ctx: ExecutorContext,
    plan: InsertPlanNode,
    child: Option<Box<dyn Executor>>,
    meta: TableMeta,
    raw_idx: usize,
}

impl InsertExecutor {
    pub fn new(
        ctx: ExecutorContext,
        plan: InsertPlanNode,
        child: Option<Box<dyn Executor>>,
    ) -> Result<Self> {
        let meta = resolve_table(&ctx, plan.table_oid)?;
        Ok(Self {
            ctx,
            plan,
            child,
            meta,
            raw_idx: 0,
        })
    }

    fn pull_source(&mut self) -> Result<Option<Tuple>> {
        match &self.plan.raw_values {
            Some(rows) => {
                if self.raw_idx >= rows.len() {
                    return Ok(None);
                }
                let tuple = Tuple::new(rows[self.raw_idx].clone());
                self.raw_idx += 1;
                Ok(Some(tuple))
            }
            None => {
                let child = self
                    .child
                    .as_mut()
                    .expect("insert without raw values needs a child");
                Ok(child.next()?.map(|(tuple, _)| tuple))
            }
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        self.raw_idx = 0;
        if let Some(child) = self.child.as_mut() {
            child.init()?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        let Some(tuple) = self.pull_source()? else {
            return Ok(None);
        };

        let rid = self
            .meta
            .table
            .insert_tuple(&tuple, self.meta.oid, Some(&self.ctx.txn))?;

        for index_meta in self.meta.indexes.iter() {
            let key = tuple.key_from_tuple(&index_meta.key_attrs)?;
            index_meta.index.insert_entry(&key, rid)?;
            self.ctx.txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: self.meta.oid,
                index_oid: index_meta.oid,
                wtype: WType::Insert,
                tuple: tuple.clone(),
            });
        }

        Ok(Some((tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.meta.schema
    }
}
