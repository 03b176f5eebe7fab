use anyhow::{Context, Result};

const HASH_COST: u32 = bcrypt::DEFAULT_COST;

/// Hashes a password with bcrypt on a blocking thread.
pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, HASH_COST))
        .await
        .context("Password hashing task panicked")?
        .context("Failed to hash password")
}

/// Checks a password against a stored bcrypt hash. A malformed hash never verifies.
pub async fn verify_password(password: String, hashed_password: String) -> Result<bool> {
    let verified = tokio::task::spawn_blocking(move || {
        bcrypt::verify(password, &hashed_password).unwrap_or(false)
    })
    .await
    .context("Password verification task panicked")?;
    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_password_verifies() {
        let hashed = hash_password("correct horse".into()).await.unwrap();
        assert_ne!(hashed, "correct horse");
        assert!(verify_password("correct horse".into(), hashed.clone()).await.unwrap());
        assert!(!verify_password("battery staple".into(), hashed).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_is_rejected() {
        assert!(!verify_password("anything".into(), "not-a-hash".into()).await.unwrap());
    }
}
