use crate::db::connection::DbPool;
use crate::db::models::User;
use sqlx::Error;
use uuid::Uuid;

/// Insert the user on first login, refresh profile fields afterwards.
pub async fn upsert_user(
    pool: &DbPool,
    email: &str,
    name: Option<&str>,
    picture: Option<&str>,
) -> Result<User, Error> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, name, picture) VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, picture = EXCLUDED.picture
        RETURNING id, email, name, picture, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(name)
    .bind(picture)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

pub async fn get_user(pool: &DbPool, user_id: Uuid) -> Result<Option<User>, Error> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, name, picture, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}
