use actix_web::{middleware, web, App, HttpServer};

use crate::config::Config;
use crate::extraction::TextExtractor;
use crate::grading::Grader;
use crate::service::{auth, pages, question, resources, submission, upload};
use crate::session_server::SessionServerHandle;
use crate::sql_server::SqlServerHandle;

/// 注册所有路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::index))
        .route("/resources/{filename:.*}", web::get().to(resources::resources))
        .service(
            web::scope("/api")
                .route("/register", web::post().to(auth::register))
                .route("/login", web::post().to(auth::login))
                .route("/logout", web::post().to(auth::logout))
                .route("/teacher/questions", web::get().to(question::teacher_questions))
                .route("/questions", web::post().to(question::create_question))
                .route("/questions", web::get().to(question::open_questions))
                .route("/questions/{id}", web::get().to(question::view_question))
                .route("/questions/{id}", web::delete().to(question::delete_question))
                .route("/questions/{id}/submissions", web::get().to(question::best_submissions))
                .route("/questions/{id}/submit", web::post().to(submission::submit))
                .route("/submissions/{id}/review", web::get().to(submission::review))
                .route("/extract", web::post().to(upload::extract)),
        );
}

// 启动actix服务
pub async fn run(
    config: Config,
    sql_server: SqlServerHandle,
    sessions: SessionServerHandle,
    grader: Grader,
    extractor: TextExtractor,
) -> std::io::Result<()> {
    let bind = config.server.bind.clone();
    let config = web::Data::new(config);
    let sql_server = web::Data::new(sql_server);
    let sessions = web::Data::new(sessions);
    let grader = web::Data::new(grader);
    let extractor = web::Data::new(extractor);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(config.clone())
            .app_data(sql_server.clone())
            .app_data(sessions.clone())
            .app_data(grader.clone())
            .app_data(extractor.clone())
            .configure(configure)
    })
    .bind(&bind)
    .map_err(|e| {
        log::error!("HTTP服务无法绑定端口{}: {}", bind, e);
        e
    })?
    .run();
    log::info!("HTTP服务启动成功，监听{}", bind);
    server.await
}
