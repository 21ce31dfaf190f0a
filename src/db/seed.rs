use crate::db;
use crate::domain::models::UserRole;
use anyhow::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use sqlx::SqlitePool;

/// Seeds a demo tenant on an empty database when SEED_DEMO=1. Handy for
/// local runs; a no-op everywhere else.
pub async fn seed_demo(pool: &SqlitePool) -> Result<()> {
    if std::env::var("SEED_DEMO").as_deref() != Ok("1") {
        return Ok(());
    }

    let companies = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM companies")
        .fetch_one(pool)
        .await?;
    if companies > 0 {
        tracing::debug!("seed skipped, database not empty");
        return Ok(());
    }

    let company = db::insert_company(pool, "Demo Co").await?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(b"demo-password", &salt)
        .map_err(|e| anyhow::anyhow!("hash failed: {e}"))?
        .to_string();
    db::insert_user(
        pool,
        company.id,
        "admin@demo.co",
        &hash,
        "Demo Admin",
        UserRole::HrAdmin,
    )
    .await?;

    tracing::info!("seeded demo company {} (admin@demo.co)", company.id);
    Ok(())
}
