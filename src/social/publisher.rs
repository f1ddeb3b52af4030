//! Platform-agnostic social publisher.
//!
//! `PostSink` is the seam between the game loop and the outside world;
//! `SocialPublisher` is the production implementation. In nosocial mode
//! the post text is logged as a preview instead of being published,
//! which keeps the dedup ledger exercised end to end.

use tracing::info;

use super::bluesky::{self, BlueskyClient};
use super::post::{PostError, PostKind, PostRef};

/// Contract between the game loop and the posting side.
#[allow(async_fn_in_trait)]
pub trait PostSink {
    /// Platform name used to key thread roots in the post ledger.
    fn platform(&self) -> &str;

    async fn post(
        &mut self,
        kind: PostKind,
        text: &str,
        reply_to: Option<&PostRef>,
    ) -> Result<PostRef, PostError>;
}

pub struct SocialPublisher {
    bluesky: Option<BlueskyClient>,
    nosocial: bool,
}

impl SocialPublisher {
    pub fn new(bluesky: Option<BlueskyClient>, nosocial: bool) -> Self {
        Self { bluesky, nosocial }
    }

    /// Log in across enabled clients. Safe to call unconditionally;
    /// a failed login is reported but not fatal - the first post will
    /// retry it.
    pub async fn login(&mut self) -> Result<(), PostError> {
        if self.nosocial {
            return Ok(());
        }
        if let Some(ref mut client) = self.bluesky {
            client.login().await?;
        }
        Ok(())
    }

    fn log_preview(kind: PostKind, text: &str) {
        let preview: String = text.chars().take(180).collect();
        let preview = preview.replace('\n', " ");
        info!(kind = %kind, preview = %preview, "[NOSOCIAL] Would post");
    }
}

impl PostSink for SocialPublisher {
    fn platform(&self) -> &str {
        if self.nosocial {
            "nosocial"
        } else {
            bluesky::PLATFORM
        }
    }

    async fn post(
        &mut self,
        kind: PostKind,
        text: &str,
        reply_to: Option<&PostRef>,
    ) -> Result<PostRef, PostError> {
        if self.nosocial {
            Self::log_preview(kind, text);
            return Ok(PostRef {
                platform: "nosocial".to_string(),
                uri: format!("nosocial://{}", kind),
                cid: String::new(),
            });
        }

        match self.bluesky {
            Some(ref mut client) => client.post(text, reply_to).await,
            None => Err(PostError::Disabled),
        }
    }
}
