/*
 * appseed/api - the objects appseed reads from its configuration and the
 * third-party custom resources it writes into the cluster.
 */

pub mod argocd;
pub use argocd::Application;
pub use argocd::ApplicationSpec;
pub use argocd::ApplicationStatus;

pub mod cnpg;
pub use cnpg::PostgresCluster;
pub use cnpg::PostgresClusterSpec;

pub mod credential;
pub use credential::CredentialRecord;
pub use credential::CustomField;
pub use credential::DuplicateStrategy;
pub use credential::VaultStatus;

pub mod descriptor;
pub use descriptor::AppDescriptor;
pub use descriptor::AppSource;
pub use descriptor::SecretSpec;
pub use descriptor::VolumeRole;

pub mod external_secrets;
pub use external_secrets::ExternalSecret;

pub mod k8up;
pub use k8up::Restore;
pub use k8up::RestoreStatus;
