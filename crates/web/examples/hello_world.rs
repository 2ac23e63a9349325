use http::{Method, StatusCode};

use arbor_web::{Router, Server, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::builder()
        .route(
            Method::GET,
            "/",
            |ctx| {
                ctx.write(StatusCode::OK, "hello world");
                Ok(())
            },
            vec![],
        )?
        .route(
            Method::GET,
            "/greet/{str:name}",
            |ctx| {
                let name = ctx.path_params().first().cloned().unwrap_or_default();
                ctx.write(StatusCode::OK, format!("hello, {name}!"));
                Ok(())
            },
            vec![],
        )?
        .build();

    let config = ServerConfig::default().port(8080);
    Server::builder().config(config).router(router).build()?.bind()?.run()?;
    Ok(())
}
