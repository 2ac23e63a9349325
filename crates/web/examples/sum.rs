//! Typed path segments: `/sum/3/4` answers `7`, `/avg/1.5/2.5` answers `2`.

use http::{Method, StatusCode};

use arbor_web::{Router, Server, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::builder()
        .route(
            Method::GET,
            "/sum/{int:a}/{int:b}",
            |ctx| {
                let a: i64 = ctx.path_param(0).ok_or("missing operand")?;
                let b: i64 = ctx.path_param(1).ok_or("missing operand")?;
                ctx.write(StatusCode::OK, (a + b).to_string());
                Ok(())
            },
            vec![],
        )?
        .route(
            Method::GET,
            "/avg/{double:a}/{double:b}",
            |ctx| {
                let a: f64 = ctx.path_param(0).ok_or("missing operand")?;
                let b: f64 = ctx.path_param(1).ok_or("missing operand")?;
                ctx.write(StatusCode::OK, ((a + b) / 2.0).to_string());
                Ok(())
            },
            vec![],
        )?
        .route(
            Method::GET,
            "/files/{*path}",
            |ctx| {
                let path = ctx.tail().unwrap_or_default().to_owned();
                ctx.write(StatusCode::OK, format!("would serve {path}"));
                Ok(())
            },
            vec![],
        )?
        .build();

    let config = ServerConfig::default().port(8080);
    Server::builder().config(config).router(router).build()?.bind()?.run()?;
    Ok(())
}
