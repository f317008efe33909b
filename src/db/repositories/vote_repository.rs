use crate::db::connection::DbPool;
use crate::db::models::Vote;
use sqlx::Error;
use uuid::Uuid;

pub async fn find_vote(
    pool: &DbPool,
    poll_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Vote>, Error> {
    let vote = sqlx::query_as::<_, Vote>(
        "SELECT id, poll_id, option_id, user_id, created_at FROM votes WHERE poll_id = $1 AND user_id = $2",
    )
    .bind(poll_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(vote)
}

/// Record a first vote: insert the vote row and bump the chosen option.
pub async fn cast_vote(
    pool: &DbPool,
    poll_id: Uuid,
    option_id: Uuid,
    user_id: Uuid,
) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO votes (id, poll_id, option_id, user_id) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(poll_id)
        .bind(option_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE poll_options SET count = count + 1 WHERE id = $1")
        .bind(option_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE polls SET updated_at = NOW() WHERE id = $1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Move an existing vote to another option.
pub async fn switch_vote(
    pool: &DbPool,
    vote_id: Uuid,
    poll_id: Uuid,
    old_option_id: Uuid,
    new_option_id: Uuid,
) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE votes SET option_id = $2 WHERE id = $1")
        .bind(vote_id)
        .bind(new_option_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE poll_options SET count = count - 1 WHERE id = $1 AND count > 0")
        .bind(old_option_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE poll_options SET count = count + 1 WHERE id = $1")
        .bind(new_option_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE polls SET updated_at = NOW() WHERE id = $1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Withdraw a vote entirely.
pub async fn revert_vote(
    pool: &DbPool,
    vote_id: Uuid,
    poll_id: Uuid,
    option_id: Uuid,
) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM votes WHERE id = $1")
        .bind(vote_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE poll_options SET count = count - 1 WHERE id = $1 AND count > 0")
        .bind(option_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE polls SET updated_at = NOW() WHERE id = $1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
