mod store;

pub use store::{FileStore, Records, StateStore};
