//! Utilities for generating deterministic, human-friendly slugs.
//!
//! Slug derivation stays pure; consumers provide their own uniqueness
//! predicate (usually a repository lookup) so persistence conflicts are
//! resolved with monotonic suffixes without coupling this module to storage.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

/// Errors that can occur while generating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Errors that can occur while generating a slug via an async uniqueness check.
#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Produce a slug that does not collide according to the supplied predicate.
///
/// The `is_unique` closure must return `true` when the provided slug does not
/// already exist. The helper retries by suffixing a monotonic counter
/// (`-2`, `-3`, …).
pub fn generate_unique_slug<F>(input: &str, mut is_unique: F) -> Result<String, SlugError>
where
    F: FnMut(&str) -> bool,
{
    let base = derive_slug(input)?;

    if is_unique(&base) {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate) {
            return Ok(candidate);
        }
    }

    Err(SlugError::Exhausted { base })
}

/// Async variant of [`generate_unique_slug`] that awaits the uniqueness predicate.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(&base).await.map_err(SlugAsyncError::Predicate)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate)
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}
