pub mod directory_client;
pub mod history_client;
pub mod identity;

pub use directory_client::DirectoryClient;
pub use history_client::HistoryClient;
pub use identity::IdentityResolver;
