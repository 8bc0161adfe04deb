use crate::errors::Result;

use async_trait::async_trait;

/* What an OIDC provider hands back for a newly registered application */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcClient {
    pub client_id: String,
    pub client_secret: String,
}

/*
 * Optional identity provider applications can be registered with.
 */
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_application(&self, name: &str, redirect_uris: &[String], logout_uris: &[String]) -> Result<OidcClient>;

    async fn create_role(&self, key: &str, display_name: &str, group: &str) -> Result<()>;
}
