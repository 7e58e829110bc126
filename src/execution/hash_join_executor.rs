use std::collections::HashMap;

use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple, INVALID_RID};
use crate::types::Value;

use super::plans::HashJoinPlanNode;
use super::{Executor, ExecutorContext};

/// Build-side hash join: `init` materializes the left child keyed by
/// the join expression; `next` advances the right child and, on a hash
/// hit, drains the matching left bucket one row at a time before
/// pulling the next probe row.
pub struct HashJoinExecutor {
    #[allow(dead_code)]
    ctx: ExecutorContext,
    plan: HashJoinPlanNode,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    table: HashMap<Value, Vec<Tuple>>,
    right_tuple: Option<Tuple>,
    bucket: Vec<Tuple>,
    bucket_idx: usize,
}

impl HashJoinExecutor {
    pub fn new(
        ctx: ExecutorContext,
        plan: HashJoinPlanNode,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
    ) -> Self {
        Self {
            ctx,
            plan,
            left,
            right,
            table: HashMap::new(),
            right_tuple: None,
            bucket: vec![],
            bucket_idx: 0,
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

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()?;

        let schema = self.left.output_schema().clone();
        self.table.clear();
        while let Some((tuple, _)) = self.left.next()? {
            let key = self.plan.left_key.evaluate(&tuple, &schema)?;
            self.table.entry(key).or_default().push(tuple);
        }

        self.right_tuple = None;
        self.bucket = vec![];
        self.bucket_idx = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        loop {
            if let Some(right_tuple) = self.right_tuple.clone() {
                if self.bucket_idx < self.bucket.len() {
                    let left_tuple = self.bucket[self.bucket_idx].clone();
                    self.bucket_idx += 1;
                    let out = self.project(&left_tuple, &right_tuple)?;
                    return Ok(Some((out, INVALID_RID)));
                }
                self.right_tuple = None;
            }

            let Some((right_tuple, _)) = self.right.next()? else {
                return Ok(None);
            };
            let key = self
                .plan
                .right_key
                .evaluate(&right_tuple, self.right.output_schema())?;
            if let Some(bucket) = self.table.get(&key) {
                self.bucket = bucket.clone();
                self.bucket_idx = 0;
                self.right_tuple = Some(right_tuple);
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
