//! Artifact stores for the mandible image service.
//!
//! Every backend implements the same [`ImageStore`] contract over
//! `(save, exists, get)`; [`MultiStore`] composes an ordered list of
//! backends behind the same contract (all-must-succeed writes, any-true
//! existence, first-success reads). [`HashGenerator`] produces the short
//! store-unique identifiers uploads are keyed by.

pub mod factory;
pub mod gcs;
pub mod hash;
pub mod local;
pub mod mapper;
pub mod memory;
pub mod multi;
pub mod object;
pub mod s3;
pub mod selectel;
pub mod traits;

pub use factory::create_stores;
pub use gcs::GcsStore;
pub use hash::HashGenerator;
pub use local::LocalStore;
pub use mapper::NamePathMapper;
pub use memory::InMemoryStore;
pub use multi::MultiStore;
pub use object::StoreObject;
pub use s3::S3Store;
pub use selectel::SelectelStore;
pub use traits::{read_all, ByteStream, ImageStore, StoreError, StoreResult};
