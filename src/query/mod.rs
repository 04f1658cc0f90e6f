pub mod ast;
pub mod date;
pub mod eval;

pub use ast::{Condition, ConditionError, Filter, PropCondition, Rule};
pub use date::DateCondition;
pub use eval::{build_query_matcher, QueryMatcher};
