use anyhow::Result;

use crate::concurrency::transaction::IsolationLevel;
use crate::table::table_iterator::TableIterator;
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};

use super::plans::SeqScanPlanNode;
use super::{resolve_table, Executor, ExecutorContext, TableMeta};

/// Walks the table heap, filters on the optional predicate and projects
/// the output columns. Under READ_COMMITTED and REPEATABLE_READ every
/// emitted row is read under a SHARED lock; READ_COMMITTED gives the
/// lock back as soon as the row is projected.
pub struct SeqScanExecutor {
    ctx: ExecutorContext,
    plan: SeqScanPlanNode,
    meta: Option<TableMeta>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: ExecutorContext, plan: SeqScanPlanNode) -> Self {
        Self {
            ctx,
            plan,
            meta: None,
            iter: None,
        }
    }

    fn project(&self, tuple: &Tuple, schema: &Schema) -> Result<Tuple> {
        let values = self
            .plan
            .output_exprs
            .iter()
            .map(|expr| expr.evaluate(tuple, schema))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tuple::new(values))
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        let meta = resolve_table(&self.ctx, self.plan.table_oid)?;
        self.iter = Some(meta.table.iter()?);
        self.meta = Some(meta);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        let isolation = self.ctx.txn.isolation_level();

        loop {
            let Some(entry) = self.iter.as_mut().and_then(|iter| iter.next()) else {
                return Ok(None);
            };
            let (rid, tuple) = entry;
            let schema = &self.meta.as_ref().unwrap().schema;

            if let Some(predicate) = &self.plan.predicate {
                if !predicate.evaluate(&tuple, schema)?.bool()? {
                    continue;
                }
            }

            let locked_here = match isolation {
                IsolationLevel::ReadCommitted | IsolationLevel::RepeatableRead => {
                    self.ctx.acquire_shared(rid)?
                }
                IsolationLevel::ReadUncommitted => false,
            };

            let out = self.project(&tuple, schema)?;

            // 2PL consequence: under READ_COMMITTED the lock window is
            // exactly the projection above
            if isolation == IsolationLevel::ReadCommitted && locked_here {
                self.ctx.lock_manager.unlock(&self.ctx.txn, rid)?;
            }

            return Ok(Some((out, rid)));
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
