//! Before/after aspects: a default token gate that short-circuits, a
//! mandatory audit hook that runs regardless, and a custom exception handler.

use http::{Method, StatusCode};
use tracing::info;

use arbor_web::{Aspect, Router, Server, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let token_gate = Aspect::before("token-gate", |ctx| {
        let authorized = ctx.query_value("token").is_some_and(|t| t == "open-sesame");
        if !authorized {
            ctx.write(StatusCode::UNAUTHORIZED, "missing or bad token");
        }
        Ok(())
    });

    let audit = Aspect::mandatory_before("audit", |ctx| {
        info!(method = %ctx.method(), path = ctx.path(), "request seen");
        Ok(())
    });

    let stamp = Aspect::after("stamp", |ctx| {
        ctx.response_mut().headers_mut().set("x-served-by", "arbor");
        Ok(())
    });

    let router = Router::builder()
        .route(
            Method::GET,
            "/secret",
            |ctx| {
                ctx.write(StatusCode::OK, "the treasure room");
                Ok(())
            },
            vec![token_gate, audit, stamp],
        )?
        .route(
            Method::GET,
            "/flaky",
            |_| Err("this endpoint always fails".into()),
            vec![],
        )?
        .exception_handler(|ctx, error| {
            ctx.write(StatusCode::INTERNAL_SERVER_ERROR, format!("recovered from: {error}"));
        })
        .build();

    let config = ServerConfig::default().port(8080);
    Server::builder().config(config).router(router).build()?.bind()?.run()?;
    Ok(())
}
