// ABOUTME: Resolves the runtime image tag to a pinned image id once at startup
// ABOUTME: The resulting handle is shared read-only by every sandbox instance

use crate::engine::Engine;
use crate::error::{Result, SandboxError};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Pinned reference to the runtime image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    tag: String,
    id: String,
    resolved_at: DateTime<Utc>,
}

impl ImageHandle {
    /// Logical tag the handle was resolved from
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Content-addressed image id containers are created from
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }
}

pub struct ImageRegistry;

impl ImageRegistry {
    /// Look `tag` up in the engine's local image store.
    ///
    /// Fails with [`SandboxError::ImageNotFound`] when the image has not been built;
    /// nothing is pulled.
    pub async fn resolve_runtime_image(engine: &dyn Engine, tag: &str) -> Result<ImageHandle> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(SandboxError::InvalidRequest(
                "runtime image tag cannot be empty".to_string(),
            ));
        }

        let details = engine
            .inspect_image(tag)
            .await?
            .ok_or_else(|| SandboxError::ImageNotFound {
                image: tag.to_string(),
            })?;

        if details.id.is_empty() {
            warn!("Image {} reported an empty id", tag);
            return Err(SandboxError::ImageNotFound {
                image: tag.to_string(),
            });
        }

        info!("Resolved runtime image {} to {}", tag, details.id);

        Ok(ImageHandle {
            tag: tag.to_string(),
            id: details.id,
            resolved_at: Utc::now(),
        })
    }
}
