use actix_web::{web, HttpResponse};
use serde_json::{json, Value};

use super::meter::MonthlyUsage;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;

const UNLIMITED: &str = "unlimited";

fn current_usage_body(usage: &MonthlyUsage) -> Value {
    let status = usage.status;
    let (monthly_limit, tokens_remaining) = if status.is_paid {
        (json!(UNLIMITED), json!(UNLIMITED))
    } else {
        (json!(status.limit), json!(status.remaining))
    };

    json!({
        "success": true,
        "usage": {
            "tokens_used_this_month": usage.totals.total_tokens,
            "monthly_limit": monthly_limit,
            "tokens_remaining": tokens_remaining,
            "limit_exceeded": status.exceeded,
            "input_tokens": usage.totals.input_tokens,
            "output_tokens": usage.totals.output_tokens,
            "request_count": usage.totals.request_count,
            "month_start": usage.window.start,
            "month_end": usage.window.end,
            "isPaid": status.is_paid,
        }
    })
}

fn limit_check_body(usage: &MonthlyUsage) -> Value {
    let status = usage.status;
    if status.is_paid {
        return json!({
            "success": true,
            "exceeded": false,
            "isPaid": true,
            "message": "Unlimited usage - paid account",
        });
    }

    let message = if status.exceeded {
        "Free usage limit reached".to_string()
    } else {
        format!("{} tokens remaining", status.remaining)
    };

    json!({
        "success": true,
        "exceeded": status.exceeded,
        "isPaid": false,
        "tokens_used": status.used,
        "limit": status.limit,
        "remaining": status.remaining,
        "message": message,
    })
}

pub async fn current(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = state.auth_service.current_user(&auth.claims).await?;
    let usage = state.usage.monthly_usage(&user, &chrono::Local::now()).await?;
    Ok(HttpResponse::Ok().json(current_usage_body(&usage)))
}

pub async fn limit_check(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = state.auth_service.current_user(&auth.claims).await?;
    let usage = state.usage.monthly_usage(&user, &chrono::Local::now()).await?;
    Ok(HttpResponse::Ok().json(limit_check_body(&usage)))
}
