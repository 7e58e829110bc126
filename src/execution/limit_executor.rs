use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};

use super::plans::LimitPlanNode;
use super::{Executor, ExecutorContext};

/// Forwards at most `limit` child rows.
pub struct LimitExecutor {
    #[allow(dead_code)]
    ctx: ExecutorContext,
    plan: LimitPlanNode,
    child: Box<dyn Executor>,
    count: usize,
}

impl LimitExecutor {
    pub fn new(ctx: ExecutorContext, plan: LimitPlanNode, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            plan,
            child,
            count: 0,
        }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> Result<()> {
        self.count = 0;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        if self.count >= self.plan.limit {
            return Ok(None);
        }
        let Some(row) = self.child.next()? else {
            return Ok(None);
        };
        self.count += 1;
        Ok(Some(row))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
