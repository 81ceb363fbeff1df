use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Html,
};
use minijinja::context;
use std::sync::Arc;

use crate::web::handlers::read_ask_form;
use crate::web::state::AppState;
use crate::web::templates::render_template;
use crate::web::view::{ResultView, highlight_sql};

// Main UI entry point
pub async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_template(
        &state.template_env,
        "index.html",
        context! {
            accept => state.accepted_extensions(),
            accept_scripts => state.pipeline.accepts_scripts(),
            upload_optional => state.upload_optional(),
            model => state.pipeline.model(),
            policy => state.pipeline.policy().to_string(),
        },
    ))
}

// Form submission: run the whole pipeline and render the outcome below the form
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Html<String>, (StatusCode, String)> {
    let request = read_ask_form(multipart).await?;
    let report = state.pipeline.run(request).await;

    let view = ResultView::from_report(&report);
    let sql_html = report.sql.as_deref().map(highlight_sql);

    Ok(Html(render_template(
        &state.template_env,
        "result.html",
        context! {
            accept => state.accepted_extensions(),
            accept_scripts => state.pipeline.accepts_scripts(),
            upload_optional => state.upload_optional(),
            model => state.pipeline.model(),
            policy => state.pipeline.policy().to_string(),
            question => report.question,
            sql_html => sql_html,
            view => view,
        },
    )))
}
