use debiai_client::{init_logging, AppConfig, Debiai};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::load()?;
    println!("Connecting to DebiAI at {}", config.backend.url);

    let debiai = Debiai::connect(config).await?;
    let projects = debiai.get_projects().await?;
    println!("{} project(s) found", projects.len());
    for project in &projects {
        print!("{}", project);
        let info = project.info();
        if let Some(count) = info.sample_count {
            println!("Samples : {}", count);
        }
        println!("Models : {}", info.models.len());
    }

    Ok(())
}
