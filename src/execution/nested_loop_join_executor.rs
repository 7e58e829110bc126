use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple, INVALID_RID};

use super::plans::NestedLoopJoinPlanNode;
use super::{Executor, ExecutorContext};

/// Classic doubly-nested join: for every left row the right child is
/// re-initialized and scanned in full, emitting rows that satisfy the
/// join predicate.
pub struct NestedLoopJoinExecutor {
    #[allow(dead_code)]
    ctx: ExecutorContext,
    plan: NestedLoopJoinPlanNode,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    left_tuple: Option<Tuple>,
    started: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        ctx: ExecutorContext,
        plan: NestedLoopJoinPlanNode,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
    ) -> Self {
        Self {
            ctx,
            plan,
            left,
            right,
            left_tuple: None,
            started: false,
        }
    }

    fn project(&self, left_tuple: &Tuple, right_tuple: &Tuple) -> Result<Tuple> {
        let values = self
            .plan
            .output_exprs
            .iter()
            .map(|expr| {
                expr.evaluate_join(
                    left_tuple,
                    self.left.output_schema(),
                    right_tuple,
                    self.right.output_schema(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Tuple::new(values))
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()?;
        self.left_tuple = None;
        self.started = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if !self.started {
            self.started = true;
            self.left_tuple = self.left.next()?.map(|(tuple, _)| tuple);
        }

        loop {
            let Some(left_tuple) = self.left_tuple.clone() else {
                return Ok(None);
            };

            while let Some((right_tuple, _)) = self.right.next()? {
                let matched = self
                    .plan
                    .predicate
                    .evaluate_join(
                        &left_tuple,
                        self.left.output_schema(),
                        &right_tuple,
                        self.right.output_schema(),
                    )?
                    .bool()?;
                if matched {
                    let out = self.project(&left_tuple, &right_tuple)?;
                    return Ok(Some((out, INVALID_RID)));
                }
            }

            // right side exhausted; advance the outer row and rescan
            self.left_tuple = self.left.next()?.map(|(tuple, _)| tuple);
            if self.left_tuple.is_some() {
                self.right.init()?;
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
