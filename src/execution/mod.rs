pub mod expressions;
pub mod plans;

mod aggregation_executor;
mod delete_executor;
mod distinct_executor;
mod hash_join_executor;
mod insert_executor;
mod limit_executor;
mod nested_loop_join_executor;
mod seq_scan_executor;
mod update_executor;

pub use aggregation_executor::AggregationExecutor;
pub use delete_executor::DeleteExecutor;
pub use distinct_executor::DistinctExecutor;
pub use hash_join_executor::HashJoinExecutor;
pub use insert_executor::InsertExecutor;
pub use limit_executor::LimitExecutor;
pub use nested_loop_join_executor::NestedLoopJoinExecutor;
pub use seq_scan_executor::SeqScanExecutor;
pub use update_executor::UpdateExecutor;

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::buffer_pool::ArcBufferPool;
use crate::catalog::{ArcCatalog, IndexOid, TableOid};
use crate::concurrency::lock_manager::LockManager;
use crate::concurrency::transaction::Transaction;
use crate::concurrency::txn_manager::ArcTransactionManager;
use crate::errors::{AbortReason, Error};
use crate::index::Index;
use crate::table::TableHeap;
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};

/// The Volcano contract: `init` once, then pull rows until `next`
/// returns `None`. Single-threaded per query.
pub trait Executor {
    fn init(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<(Tuple, Rid)>>;
    fn output_schema(&self) -> &Schema;
}

/// Everything an operator needs to touch the engine, bundled so no
/// executor reaches for process-wide state.
#[derive(Clone)]
pub struct ExecutorContext {
    pub bpm: ArcBufferPool,
    pub catalog: ArcCatalog,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: ArcTransactionManager,
    pub txn: Arc<Transaction>,
}

impl ExecutorContext {
    /// Take a SHARED lock unless one (or stronger) is already held.
    /// Returns whether this call acquired a fresh lock.
    fn acquire_shared(&self, rid: Rid) -> Result<bool> {
        if self.txn.is_shared_locked(rid) || self.txn.is_exclusive_locked(rid) {
            return Ok(false);
        }
        if !self.lock_manager.lock_shared(&self.txn, rid)? {
            self.txn_manager.abort(&self.txn)?;
            bail!(Error::TransactionAborted(
                self.txn.id(),
                AbortReason::Deadlock
            ));
        }
        Ok(true)
    }

    /// Promote to EXCLUSIVE: upgrade a held SHARED lock, otherwise lock
    /// outright.
    fn acquire_exclusive(&self, rid: Rid) -> Result<()> {
        let acquired = if self.txn.is_shared_locked(rid) {
            self.lock_manager.lock_upgrade(&self.txn, rid)?
        } else if !self.txn.is_exclusive_locked(rid) {
            self.lock_manager.lock_exclusive(&self.txn, rid)?
        } else {
            true
        };
        if !acquired {
            self.txn_manager.abort(&self.txn)?;
            bail!(Error::TransactionAborted(
                self.txn.id(),
                AbortReason::Deadlock
            ));
        }
        Ok(())
    }
}

pub(crate) struct IndexMeta {
    pub(crate) oid: IndexOid,
    pub(crate) key_attrs: Vec<usize>,
    pub(crate) index: Arc<Index>,
}

pub(crate) struct TableMeta {
    pub(crate) oid: TableOid,
    pub(crate) schema: Schema,
    pub(crate) table: Arc<TableHeap>,
    pub(crate) indexes: Vec<IndexMeta>,
}

/// Snapshot the catalog entries an executor needs, so `next` never
/// holds the catalog lock.
pub(crate) fn resolve_table(ctx: &ExecutorContext, oid: TableOid) -> Result<TableMeta> {
    let catalog = ctx.catalog.read();
    let Some(info) = catalog.get_table(oid) else {
        bail!(Error::TableNotFound(format!("oid {oid}")));
    };
    let indexes = catalog
        .get_table_indexes(&info.name)
        .into_iter()
        .map(|index_info| IndexMeta {
            oid: index_info.oid,
            key_attrs: index_info.key_attrs.clone(),
            index: index_info.index.clone(),
        })
        .collect();
    Ok(TableMeta {
        oid,
        schema: info.schema.clone(),
        table: info.table.clone(),
        indexes,
    })
}

#[cfg(test)]
pub mod tests {
    use super::expressions::{ComparisonOp, Expression};
    use super::plans::*;
    use super::*;
    use crate::buffer_pool::tests::test_arc_bpm;
    use crate::catalog::Catalog;
    use crate::concurrency::transaction::{IsolationLevel, TransactionState};
    use crate::concurrency::txn_manager::TransactionManager;
    use crate::tuple::schema::Field;
    use crate::types::{Types, Value};
    use parking_lot::RwLock;

    pub fn test_context(isolation: IsolationLevel) -> ExecutorContext {
        let bpm = test_arc_bpm(200);
        let catalog = Arc::new(RwLock::new(Catalog::new(bpm.clone())));
        let lock_manager = Arc::new(LockManager::new());
        let txn_manager = Arc::new(TransactionManager::new(
            lock_manager.clone(),
            catalog.clone(),
        ));
        let txn = txn_manager.begin(isolation);
        ExecutorContext {
            bpm,
            catalog,
            lock_manager,
            txn_manager,
            txn,
        }
    }

    fn users_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", Types::Int),
            Field::new("name", Types::Str),
        ])
    }

    fn setup_users(ctx: &ExecutorContext, rows: &[(i64, &str)]) -> Result<TableOid> {
        let oid = ctx
            .catalog
            .write()
            .create_table("users", &users_schema())?
            .oid;
        if !rows.is_empty() {
            let raw = rows
                .iter()
                .map(|(id, name)| vec![Value::Int(*id), Value::Str(name.to_string())])
                .collect();
            let plan = InsertPlanNode {
                table_oid: oid,
                raw_values: Some(raw),
            };
            let mut insert = InsertExecutor::new(ctx.clone(), plan, None)?;
            insert.init()?;
            while insert.next()?.is_some() {}
        }
        Ok(oid)
    }

    fn scan_all(ctx: &ExecutorContext, oid: TableOid) -> Result<Vec<(Tuple, Rid)>> {
        let plan = SeqScanPlanNode::identity(oid, &users_schema(), None);
        let mut scan = SeqScanExecutor::new(ctx.clone(), plan);
        scan.init()?;
        let mut rows = vec![];
        while let Some(row) = scan.next()? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[test]
    fn test_insert_and_seq_scan_with_predicate() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let oid = setup_users(&ctx, &[(1, "ada"), (2, "grace"), (3, "edsger")])?;

        // id >= 2 survives the filter
        let predicate = Expression::comparison(
            ComparisonOp::GtEq,
            Expression::column(0),
            Expression::literal(Value::Int(2)),
        );
        let plan = SeqScanPlanNode::identity(oid, &users_schema(), Some(predicate));
        let mut scan = SeqScanExecutor::new(ctx.clone(), plan);
        scan.init()?;

        let mut names = vec![];
        while let Some((tuple, _)) = scan.next()? {
            names.push(tuple.value_at(1)?.clone());
        }
        assert_eq!(
            names,
            vec![Value::Str("grace".into()), Value::Str("edsger".into())]
        );
        Ok(())
    }

    #[test]
    fn test_insert_from_child_maintains_index() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let src_oid = setup_users(&ctx, &[(1, "ada"), (2, "grace")])?;

        let dst_oid = ctx
            .catalog
            .write()
            .create_table("users_copy", &users_schema())?
            .oid;
        ctx.catalog
            .write()
            .create_index("users_copy_id", "users_copy", vec![0])?;

        let child = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(src_oid, &users_schema(), None),
        );
        let plan = InsertPlanNode {
            table_oid: dst_oid,
            raw_values: None,
        };
        let mut insert = InsertExecutor::new(ctx.clone(), plan, Some(Box::new(child)))?;
        insert.init()?;
        let mut inserted = 0;
        while insert.next()?.is_some() {
            inserted += 1;
        }
        assert_eq!(inserted, 2);

        // the index finds the copied rows
        let catalog = ctx.catalog.read();
        let index = &catalog.get_table_indexes("users_copy")[0].index;
        let rids = index.scan_key(&Tuple::new(vec![Value::Int(2)]))?;
        assert_eq!(rids.len(), 1);
        drop(catalog);

        assert_eq!(ctx.txn.index_write_count(), 2);
        Ok(())
    }

    #[test]
    fn test_delete_removes_rows_and_index_entries() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let oid = setup_users(&ctx, &[(1, "ada"), (2, "grace")])?;
        ctx.catalog.write().create_index("users_id", "users", vec![0])?;

        let predicate = Expression::comparison(
            ComparisonOp::Eq,
            Expression::column(0),
            Expression::literal(Value::Int(1)),
        );
        let child = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(oid, &users_schema(), Some(predicate)),
        );
        let mut delete = DeleteExecutor::new(
            ctx.clone(),
            DeletePlanNode { table_oid: oid },
            Box::new(child),
        )?;
        delete.init()?;
        let mut deleted = 0;
        while delete.next()?.is_some() {
            deleted += 1;
        }
        assert_eq!(deleted, 1);

        let remaining = scan_all(&ctx, oid)?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0.value_at(0)?, &Value::Int(2));

        let catalog = ctx.catalog.read();
        let index = &catalog.get_table_indexes("users")[0].index;
        assert!(index.scan_key(&Tuple::new(vec![Value::Int(1)]))?.is_empty());
        drop(catalog);

        // the delete registered its index write
        assert!(ctx.txn.index_write_count() >= 1);
        Ok(())
    }

    #[test]
    fn test_update_add_and_set() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let oid = setup_users(&ctx, &[(10, "ada"), (20, "grace")])?;
        ctx.catalog.write().create_index("users_id", "users", vec![0])?;

        let mut update_attrs = std::collections::HashMap::new();
        update_attrs.insert(0, UpdateInfo::Add(5));
        update_attrs.insert(1, UpdateInfo::Set(Value::Str("renamed".into())));

        let child = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(oid, &users_schema(), None),
        );
        let mut update = UpdateExecutor::new(
            ctx.clone(),
            UpdatePlanNode {
                table_oid: oid,
                update_attrs,
            },
            Box::new(child),
        )?;
        update.init()?;
        while update.next()?.is_some() {}

        let rows = scan_all(&ctx, oid)?;
        let ids: Vec<_> = rows
            .iter()
            .map(|(t, _)| t.value_at(0).unwrap().clone())
            .collect();
        assert_eq!(ids, vec![Value::Int(15), Value::Int(25)]);
        assert!(rows
            .iter()
            .all(|(t, _)| t.value_at(1).unwrap() == &Value::Str("renamed".into())));

        // old keys are gone from the index, new keys land in it
        let catalog = ctx.catalog.read();
        let index = &catalog.get_table_indexes("users")[0].index;
        assert!(index.scan_key(&Tuple::new(vec![Value::Int(10)]))?.is_empty());
        assert_eq!(index.scan_key(&Tuple::new(vec![Value::Int(15)]))?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_aggregation_with_having() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let oid = setup_users(&ctx, &[(1, "a"), (1, "b"), (2, "c"), (2, "d"), (3, "e")])?;

        let child = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(oid, &users_schema(), None),
        );
        // SELECT id, count(*), sum(id) GROUP BY id HAVING count(*) > 1
        let plan = AggregationPlanNode {
            group_bys: vec![Expression::column(0)],
            aggregates: vec![Expression::column(0), Expression::column(0)],
            agg_types: vec![AggregationType::CountStar, AggregationType::Sum],
            having: Some(Expression::comparison(
                ComparisonOp::Gt,
                Expression::AggregateRef(0),
                Expression::literal(Value::Int(1)),
            )),
            output_schema: Schema::new(vec![
                Field::new("id", Types::Int),
                Field::new("cnt", Types::Int),
                Field::new("total", Types::Int),
            ]),
            output_exprs: vec![
                Expression::GroupByRef(0),
                Expression::AggregateRef(0),
                Expression::AggregateRef(1),
            ],
        };
        let mut agg = AggregationExecutor::new(ctx.clone(), plan, Box::new(child));
        agg.init()?;

        let mut rows = vec![];
        while let Some((tuple, _)) = agg.next()? {
            rows.push((tuple.value_at(0)?.int()?, tuple.value_at(1)?.int()?, tuple.value_at(2)?.int()?));
        }
        rows.sort_unstable();
        assert_eq!(rows, vec![(1, 2, 2), (2, 2, 4)]);
        Ok(())
    }

    #[test]
    fn test_min_max_count_aggregates() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let oid = setup_users(&ctx, &[(7, "a"), (3, "b"), (9, "c")])?;

        let child = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(oid, &users_schema(), None),
        );
        let plan = AggregationPlanNode {
            group_bys: vec![],
            aggregates: vec![
                Expression::column(0),
                Expression::column(0),
                Expression::column(0),
            ],
            agg_types: vec![
                AggregationType::Min,
                AggregationType::Max,
                AggregationType::Count,
            ],
            having: None,
            output_schema: Schema::new(vec![
                Field::new("min", Types::Int),
                Field::new("max", Types::Int),
                Field::new("cnt", Types::Int),
            ]),
            output_exprs: vec![
                Expression::AggregateRef(0),
                Expression::AggregateRef(1),
                Expression::AggregateRef(2),
            ],
        };
        let mut agg = AggregationExecutor::new(ctx.clone(), plan, Box::new(child));
        agg.init()?;

        let (tuple, _) = agg.next()?.unwrap();
        assert_eq!(tuple.values(), &[Value::Int(3), Value::Int(9), Value::Int(3)]);
        assert!(agg.next()?.is_none());
        Ok(())
    }

    fn join_output_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", Types::Int),
            Field::new("left_name", Types::Str),
            Field::new("right_name", Types::Str),
        ])
    }

    fn join_output_exprs() -> Vec<Expression> {
        vec![
            Expression::join_column(0, 0),
            Expression::join_column(0, 1),
            Expression::join_column(1, 1),
        ]
    }

    #[test]
    fn test_hash_join() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let left_oid = setup_users(&ctx, &[(1, "a"), (1, "b"), (2, "c")])?;

        let right_oid = ctx
            .catalog
            .write()
            .create_table("right", &users_schema())?
            .oid;
        for (id, name) in [(1, "x"), (3, "y")] {
            let catalog = ctx.catalog.read();
            let info = catalog.get_table(right_oid).unwrap();
            info.table.insert_tuple(
                &Tuple::new(vec![Value::Int(id), Value::Str(name.into())]),
                right_oid,
                None,
            )?;
        }

        let left = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(left_oid, &users_schema(), None),
        );
        let right = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(right_oid, &users_schema(), None),
        );
        let plan = HashJoinPlanNode {
            left_key: Expression::column(0),
            right_key: Expression::column(0),
            output_schema: join_output_schema(),
            output_exprs: join_output_exprs(),
        };
        let mut join = HashJoinExecutor::new(ctx.clone(), plan, Box::new(left), Box::new(right));
        join.init()?;

        let mut rows = vec![];
        while let Some((tuple, _)) = join.next()? {
            rows.push(tuple.values().to_vec());
        }
        // both left rows with id 1 match (1, x), in left insertion order
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Str("a".into()), Value::Str("x".into())],
                vec![Value::Int(1), Value::Str("b".into()), Value::Str("x".into())],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_nested_loop_join() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let left_oid = setup_users(&ctx, &[(1, "a"), (2, "b")])?;

        let right_oid = ctx
            .catalog
            .write()
            .create_table("right", &users_schema())?
            .oid;
        {
            let catalog = ctx.catalog.read();
            let info = catalog.get_table(right_oid).unwrap();
            for (id, name) in [(2, "x"), (1, "y")] {
                info.table.insert_tuple(
                    &Tuple::new(vec![Value::Int(id), Value::Str(name.into())]),
                    right_oid,
                    None,
                )?;
            }
        }

        let left = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(left_oid, &users_schema(), None),
        );
        let right = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(right_oid, &users_schema(), None),
        );
        let plan = NestedLoopJoinPlanNode {
            predicate: Expression::comparison(
                ComparisonOp::Eq,
                Expression::join_column(0, 0),
                Expression::join_column(1, 0),
            ),
            output_schema: join_output_schema(),
            output_exprs: join_output_exprs(),
        };
        let mut join =
            NestedLoopJoinExecutor::new(ctx.clone(), plan, Box::new(left), Box::new(right));
        join.init()?;

        let mut rows = vec![];
        while let Some((tuple, _)) = join.next()? {
            rows.push(tuple.values().to_vec());
        }
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Str("a".into()), Value::Str("y".into())],
                vec![Value::Int(2), Value::Str("b".into()), Value::Str("x".into())],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_distinct_and_limit() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let oid = setup_users(&ctx, &[(1, "a"), (1, "a"), (2, "b"), (2, "b"), (3, "c")])?;

        let child = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(oid, &users_schema(), None),
        );
        let mut distinct = DistinctExecutor::new(ctx.clone(), Box::new(child));
        distinct.init()?;
        let mut rows = vec![];
        while let Some((tuple, _)) = distinct.next()? {
            rows.push(tuple.value_at(0)?.int()?);
        }
        assert_eq!(rows, vec![1, 2, 3]);

        let child = SeqScanExecutor::new(
            ctx.clone(),
            SeqScanPlanNode::identity(oid, &users_schema(), None),
        );
        let mut limit =
            LimitExecutor::new(ctx.clone(), LimitPlanNode { limit: 2 }, Box::new(child));
        limit.init()?;
        let mut count = 0;
        while limit.next()?.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        Ok(())
    }

    #[test]
    fn test_seq_scan_locks_under_repeatable_read() -> Result<()> {
        let ctx = test_context(IsolationLevel::RepeatableRead);
        let oid = setup_users(&ctx, &[(1, "a"), (2, "b")])?;

        let rows = scan_all(&ctx, oid)?;
        assert_eq!(rows.len(), 2);
        // shared locks are kept until commit
        for (_, rid) in rows.iter() {
            assert!(ctx.txn.is_shared_locked(*rid));
        }

        ctx.txn_manager.commit(&ctx.txn)?;
        assert!(ctx.txn.locked_rids().is_empty());
        Ok(())
    }

    #[test]
    fn test_seq_scan_releases_under_read_committed() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadCommitted);
        let oid = setup_users(&ctx, &[(1, "a"), (2, "b")])?;

        let rows = scan_all(&ctx, oid)?;
        assert_eq!(rows.len(), 2);
        // every per-tuple lock was released on the way out
        assert!(ctx.txn.locked_rids().is_empty());
        assert_eq!(ctx.txn.state(), TransactionState::Growing);
        Ok(())
    }

    #[test]
    fn test_abort_rolls_back_writes() -> Result<()> {
        let ctx = test_context(IsolationLevel::ReadUncommitted);
        let oid = setup_users(&ctx, &[])?;
        ctx.catalog.write().create_index("users_id", "users", vec![0])?;

        let plan = InsertPlanNode {
            table_oid: oid,
            raw_values: Some(vec![vec![Value::Int(1), Value::Str("ghost".into())]]),
        };
        let mut insert = InsertExecutor::new(ctx.clone(), plan, None)?;
        insert.init()?;
        while insert.next()?.is_some() {}
        assert_eq!(scan_all(&ctx, oid)?.len(), 1);

        ctx.txn_manager.abort(&ctx.txn)?;

        let reader = test_reader_context(&ctx);
        assert!(scan_all(&reader, oid)?.is_empty());
        let catalog = ctx.catalog.read();
        let index = &catalog.get_table_indexes("users")[0].index;
        assert!(index.scan_key(&Tuple::new(vec![Value::Int(1)]))?.is_empty());
        Ok(())
    }

    fn test_reader_context(ctx: &ExecutorContext) -> ExecutorContext {
        let mut reader = ctx.clone();
        reader.txn = ctx.txn_manager.begin(IsolationLevel::ReadUncommitted);
        reader
    }
}
