use actix_web::{web, HttpResponse};
use sqlx::PgPool;

/// Liveness plus a database round trip, so a dead pool reports 503.
pub async fn health_check(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().finish(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            HttpResponse::ServiceUnavailable().finish()
        }
    }
}
