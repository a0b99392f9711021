pub mod key;
pub mod sample_store;

pub use key::{Identifier, SampleKey};
pub use sample_store::{FsSampleStore, SampleIter, SampleStore, StoredSample};
