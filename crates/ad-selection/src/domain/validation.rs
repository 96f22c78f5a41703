use {super::auction::Caller, std::sync::Arc, thiserror::Error};

#[derive(Debug, Error)]
pub enum Rejection {
    #[error("the caller is not in the foreground")]
    NotForeground,
    #[error("the caller exceeded its rate limit")]
    RateLimited,
    #[error("the user has not consented to ad selection")]
    ConsentRevoked,
    #[error("{0}")]
    Other(String),
}

/// Decides whether a caller may run an auction at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CallerValidator: Send + Sync {
    async fn validate(&self, caller: &Caller) -> Result<(), Rejection>;
}

pub struct AllowAll;

#[async_trait::async_trait]
impl CallerValidator for AllowAll {
    async fn validate(&self, _: &Caller) -> Result<(), Rejection> {
        Ok(())
    }
}

/// Rejects callers running in the background, then defers to the wrapped
/// validator.
pub struct ForegroundValidator(pub Arc<dyn CallerValidator>);

#[async_trait::async_trait]
impl CallerValidator for ForegroundValidator {
    async fn validate(&self, caller: &Caller) -> Result<(), Rejection> {
        if !caller.foreground {
            return Err(Rejection::NotForeground);
        }
        self.0.validate(caller).await
    }
}
