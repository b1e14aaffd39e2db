//! One-shot synchronisation of the local capability cache.

use comfymcp_core::capability::CapabilityStore;

use crate::api::ComfyUIApi;

/// Make sure a capability cache exists for the configured backend.
///
/// If the cache file is missing it is fetched once from the backend and
/// written to disk. Failures are logged and swallowed: the service keeps
/// running and capability lookups explain that the cache is unavailable.
///
/// Returns whether a cache file is available afterwards.
pub async fn sync_capability_cache(api: &ComfyUIApi, store: &CapabilityStore) -> bool {
    let path = store.path();
    if store.exists().await {
        tracing::info!(path = %path.display(), "Capability cache present");
        return true;
    }

    tracing::info!(
        path = %path.display(),
        api_url = api.api_url(),
        "Capability cache missing, fetching from ComfyUI",
    );

    let object_info = match api.get_object_info().await {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Could not fetch capability description, continuing without it");
            return false;
        }
    };

    match store.save(&object_info).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Capability cache written");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not write capability cache, continuing without it");
            false
        }
    }
}
