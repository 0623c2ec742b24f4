//! Native host: actix-web in front of the same handlers the Spin component runs.

use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::{web, HttpRequest, HttpResponse, HttpServer};
use tracing::info;

use crate::handlers::handle_request;
use crate::App;

mod adapter {
    use actix_web::HttpRequest;
    use spin_sdk::http::{Method, Request, Response};

    pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
        let method = match req.method().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            _ => Method::Get,
        };

        let uri = req.uri().to_string();
        let mut builder = Request::builder();
        builder.method(method).uri(&uri);

        for (name, value) in req.headers() {
            if let Ok(val_str) = value.to_str() {
                builder.header(name.as_str(), val_str);
            }
        }

        builder.body(body.to_vec()).build()
    }

    pub fn spin_to_actix_response(spin_resp: Response) -> actix_web::HttpResponse {
        let status = actix_web::http::StatusCode::from_u16(*spin_resp.status())
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = actix_web::HttpResponse::build(status);
        for (name, value) in spin_resp.headers() {
            if let Some(value) = value.as_str() {
                response.append_header((name, value));
            }
        }

        response.body(spin_resp.body().to_vec())
    }
}

async fn handle_all(app: web::Data<App>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let spin_req = adapter::actix_to_spin_request(&req, body);
    // The handlers block on file I/O and argon2.
    let result = web::block(move || handle_request(&app, spin_req)).await;

    match result {
        Ok(spin_resp) => adapter::spin_to_actix_response(spin_resp),
        Err(_) => HttpResponse::InternalServerError()
            .json(serde_json::json!({"error": "Internal server error"})),
    }
}

/// Starts serving on an already bound listener. Tests bind port 0.
pub fn run(app: web::Data<App>, listener: TcpListener) -> std::io::Result<Server> {
    let addr = listener.local_addr()?;
    let server = HttpServer::new(move || {
        actix_web::App::new()
            .app_data(app.clone())
            .default_service(web::route().to(handle_all))
    })
    .listen(listener)?
    .run();

    info!(%addr, "Server listening");
    Ok(server)
}
