//! 参考数据持久化
//!
//! CSV导入SQLite，启动时一次性读入内存

pub mod region_store;

pub use region_store::{load_reference_data, RegionStore};
