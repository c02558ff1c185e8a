//! Query-string search pipeline: filter parsing, partitioning and
//! combination into a query tree, index execution, and result ordering.

pub mod filter;
pub mod index;
pub mod query;
pub mod sort;

pub use filter::{FilterParser, FilterValue, ParsedFilter, LOOKUP_SEP};
pub use index::SearchIndex;
pub use query::{combine, partition, strip_reserved, Partitions, QueryNode, RESERVED_KEYS};
pub use sort::{apply_sort, validate_sort};
