use crate::db::connection::DbPool;
use sqlx::Error;
use sqlx::Row;
use uuid::Uuid;

pub async fn find_like(
    pool: &DbPool,
    poll_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Uuid>, Error> {
    let row = sqlx::query("SELECT id FROM likes WHERE poll_id = $1 AND user_id = $2")
        .bind(poll_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get::<Uuid, _>("id")))
}

pub async fn add_like(pool: &DbPool, poll_id: Uuid, user_id: Uuid) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO likes (id, poll_id, user_id) VALUES ($1, $2, $3)")
        .bind(Uuid::new_v4())
        .bind(poll_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE polls SET likes = likes + 1, updated_at = NOW() WHERE id = $1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn remove_like(pool: &DbPool, like_id: Uuid, poll_id: Uuid) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM likes WHERE id = $1")
        .bind(like_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE polls SET likes = likes - 1, updated_at = NOW() WHERE id = $1 AND likes > 0")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
