pub mod document;
pub mod error;
pub mod query;
pub mod store;
pub mod values;
pub mod view;

pub use document::{Document, PropType, PropValue};
pub use error::LoadError;
pub use query::{build_query_matcher, Condition, QueryMatcher};
pub use view::SmartView;
