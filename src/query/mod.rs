pub mod bible;
pub mod cache;
pub mod key;
pub mod observer;

pub use bible::BibleQueries;
pub use cache::{CacheEvent, QueryCache, QueryOptions, Refresh};
pub use key::QueryKey;
pub use observer::{Query, QueryDef, QueryInput, QueryState, QueryStatus};
