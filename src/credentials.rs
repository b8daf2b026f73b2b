/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * Credential sources for the git remote. The serializer resolves
 * credentials fresh on every operation (see `serializer.rs`), so
 * rotation at the coordination-service layer is automatic: nothing in
 * this crate caches a `Credentials` value across calls.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::Result;

/// A resolved `(username, password)` pair, good for exactly one
/// operation.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Yields current push/pull credentials. Implementations may derive
/// them from a coordination-service token or from operator-supplied
/// static settings; either way, `credentials()` is called fresh on
/// every protected operation, so a rotating implementation never goes
/// stale.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Result<Credentials>;
}

/// Static credentials, configured once at startup. Used when both
/// `gitRemoteUser` and `gitRemotePassword` are present in the recognized
/// configuration options.
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    username: String,
    password: String,
}

impl StaticCredentialSource {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl CredentialSource for StaticCredentialSource {
    fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

/// No credentials at all — suitable for a local filesystem remote or an
/// anonymous read-only transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials::default())
    }
}

/// Wraps a resolver closure so credentials can be re-derived (e.g. from
/// a coordination-service token) on every call instead of being cached.
pub struct RotatingCredentialSource<F>
where
    F: Fn() -> Result<Credentials> + Send + Sync,
{
    resolver: F,
}

impl<F> RotatingCredentialSource<F>
where
    F: Fn() -> Result<Credentials> + Send + Sync,
{
    pub fn new(resolver: F) -> Self {
        Self { resolver }
    }
}

impl<F> CredentialSource for RotatingCredentialSource<F>
where
    F: Fn() -> Result<Credentials> + Send + Sync,
{
    fn credentials(&self) -> Result<Credentials> {
        (self.resolver)()
    }
}
