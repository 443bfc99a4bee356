//! `dsql_engine`: parses a small cross-database query language, applies
//! row-level security, plans and caches execution, generates
//! dialect-specific parameterized SQL, and runs it through a pluggable
//! [`driver::Driver`].
//!
//! The pipeline is `parser` → `rls` → `cache`/`optimizer` → `sql_writer` +
//! `generator` → `driver` → `cache`, wired together by [`engine::Engine`].

pub mod cache;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod generator;
pub mod metadata;
pub mod metrics;
pub mod optimizer;
pub mod parser;
pub mod query;
pub mod rls;
pub mod security;
pub mod sql_writer;
pub mod value;

pub use cache::{CacheStatistics, PlanCache, ResultCache, TopPlan};
pub use config::EngineConfig;
pub use engine::{Engine, ExecuteMetadata, ExecuteResult, FromRow};
pub use error::{EngineError, ParseError, Result};
pub use metadata::{
    DataType, FieldMetadata, FieldName, InMemoryMetadata, MetadataProvider, ObjName, ObjectMetadata,
    Relationship, RelationshipKind, StatisticsProvider,
};
pub use optimizer::{Index, Plan};
pub use query::{
    Aggregate, AggregateFn, CompareOp, Condition, Field, Join, JoinType, LogicalOp, NullsOrder, Operand,
    Order, Query, SortDirection,
};
pub use rls::{Policy, PolicyRegistry, RlsEnforcer};
pub use security::{CancellationToken, FixedSecurityProvider, SecurityContext, SecurityProvider};
pub use sql_writer::Dialect;
pub use value::{Row, Value};
