use std::collections::HashMap;

use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple, INVALID_RID};
use crate::types::Value;

use super::plans::{AggregationPlanNode, AggregationType};
use super::{Executor, ExecutorContext};

/// Hash aggregation: the child stream is drained at `init` into a
/// `group_bys -> aggregate values` table, then `next` walks the groups,
/// applying the optional HAVING filter.
pub struct AggregationExecutor {
    #[allow(dead_code)]
    ctx: ExecutorContext,
    plan: AggregationPlanNode,
    child: Box<dyn Executor>,
    groups: Vec<(Vec<Value>, Vec<Value>)>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(ctx: ExecutorContext, plan: AggregationPlanNode, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            plan,
            child,
            groups: vec![],
            cursor: 0,
        }
    }

    fn initial_values(&self) -> Vec<Value> {
        self.plan
            .agg_types
            .iter()
            .map(|ty| match ty {
                AggregationType::CountStar
                | AggregationType::Count
                | AggregationType::Sum => Value::Int(0),
                AggregationType::Min | AggregationType::Max => Value::Null,
            })
            .collect()
    }

    fn combine(&self, accumulated: &mut [Value], inputs: &[Value]) -> Result<()> {
        for (idx, ty) in self.plan.agg_types.iter().enumerate() {
            let input = &inputs[idx];
            match ty {
                AggregationType::CountStar => {
                    accumulated[idx] = accumulated[idx].add(&Value::Int(1))?;
                }
                AggregationType::Count => {
                    if !input.is_null() {
                        accumulated[idx] = accumulated[idx].add(&Value::Int(1))?;
                    }
                }
                AggregationType::Sum => {
                    if !input.is_null() {
                        accumulated[idx] = accumulated[idx].add(input)?;
                    }
                }
                AggregationType::Min => {
                    if !input.is_null()
                        && (accumulated[idx].is_null()
                            || input.partial_cmp(&accumulated[idx])
                                == Some(std::cmp::Ordering::Less))
                    {
                        accumulated[idx] = input.clone();
                    }
                }
                AggregationType::Max => {
                    if !input.is_null()
                        && (accumulated[idx].is_null()
                            || input.partial_cmp(&accumulated[idx])
                                == Some(std::cmp::Ordering::Greater))
                    {
                        accumulated[idx] = input.clone();
                    }
                }
            }
        }
        Ok(())
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;

        let schema = self.child.output_schema().clone();
        let mut table: HashMap<Vec<Value>, Vec<Value>> = HashMap::new();
        while let Some((tuple, _)) = self.child.next()? {
            let key = self
                .plan
                .group_bys
                .iter()
                .map(|expr| expr.evaluate(&tuple, &schema))
                .collect::<Result<Vec<_>>>()?;
            let inputs = self
                .plan
                .aggregates
                .iter()
                .map(|expr| expr.evaluate(&tuple, &schema))
                .collect::<Result<Vec<_>>>()?;

            let initial = self.initial_values();
            let accumulated = table.entry(key).or_insert(initial);
            self.combine(accumulated, &inputs)?;
        }

        self.groups = table.into_iter().collect();
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        while self.cursor < self.groups.len() {
            let (group_bys, aggregates) = &self.groups[self.cursor];
            self.cursor += 1;

            if let Some(having) = &self.plan.having {
                if !having.evaluate_aggregate(group_bys, aggregates)?.bool()? {
                    continue;
                }
            }

            let values = self
                .plan
                .output_exprs
                .iter()
                .map(|expr| expr.evaluate_aggregate(group_bys, aggregates))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Some((Tuple::new(values), INVALID_RID)));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
