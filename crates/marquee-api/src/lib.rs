pub mod credentials;
pub mod error;
pub mod tmdb;
pub mod traits;

pub use credentials::{Credential, CredentialProvider, EnvCredentials, StaticCredentials};
pub use error::SyncError;
pub use tmdb::TmdbClient;
