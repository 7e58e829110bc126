use std::collections::HashSet;

use anyhow::Result;

use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use crate::types::Value;

use super::{Executor, ExecutorContext};

/// Emits each distinct output row once, materializing the set of seen
/// composite keys on demand.
pub struct DistinctExecutor {
    #[allow(dead_code)]
    ctx: ExecutorContext,
    child: Box<dyn Executor>,
    seen: HashSet<Vec<Value>>,
}

impl DistinctExecutor {
    pub fn new(ctx: ExecutorContext, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            child,
            seen: HashSet::new(),
        }
    }
}

impl Executor for DistinctExecutor {
    fn init(&mut self) -> Result<()> {
        self.seen.clear();
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>> {
        while let Some((tuple, rid)) = self.child.next()? {
            if self.seen.insert(tuple.values().to_vec()) {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
