//! Dialect-independent AST for SQURIL queries.

pub mod element;
pub mod query;
pub mod term;

pub use element::SelectElement;
pub use query::UriQuery;
pub use term::{
    AggregateFn, AlterTerm, Combinator, GroupByTerm, OrderTerm, RangeTerm, SelectTerm, SetTerm,
    WhereTerm,
};
