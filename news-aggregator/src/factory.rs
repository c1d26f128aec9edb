use crate::job::Job;
use crate::sources::ProviderRegistry;
use crate::traits::{ArticleRepository, ProviderRepository};
use crate::types::{Provider, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Page size used while listing providers at startup.
const PROVIDER_PAGE_SIZE: usize = 500;

/// Builds the job for a single provider, exactly as startup does for each one.
pub fn build_job(
    provider: &Provider,
    registry: &ProviderRegistry,
    articles: Arc<dyn ArticleRepository>,
) -> Result<Job> {
    let feed = registry.build(provider)?;
    Ok(Job::new(provider.label.clone(), feed, articles))
}

/// Loads every stored provider and returns one job per supported provider.
///
/// Providers of an unknown type, or whose feed source cannot be built, are
/// skipped with a warning. Only a failure to list providers is an error.
pub async fn build_jobs(
    providers: &dyn ProviderRepository,
    articles: Arc<dyn ArticleRepository>,
    registry: &ProviderRegistry,
) -> Result<Vec<Job>> {
    let all = list_all_providers(providers).await?;
    let mut jobs = Vec::new();

    for provider in &all {
        if !registry.supports(&provider.provider_type) {
            warn!(
                "Skipping provider `{}` - type `{}` not supported",
                provider.label, provider.provider_type
            );
            continue;
        }

        match build_job(provider, registry, articles.clone()) {
            Ok(job) => jobs.push(job),
            Err(e) => warn!("Skipping provider `{}` - unable to create job: {}", provider.label, e),
        }
    }

    info!("Built {} jobs from {} providers", jobs.len(), all.len());
    Ok(jobs)
}

async fn list_all_providers(providers: &dyn ProviderRepository) -> Result<Vec<Provider>> {
    let mut all = Vec::new();
    let mut offset = 0;

    loop {
        let page = providers.get_providers(offset, PROVIDER_PAGE_SIZE).await?;
        let fetched = page.len();
        all.extend(page);

        if fetched < PROVIDER_PAGE_SIZE {
            break;
        }
        offset += fetched;
    }

    Ok(all)
}
