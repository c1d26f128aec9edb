use crate::factory::build_job;
use crate::job::Job;
use crate::sources::ProviderRegistry;
use crate::supervisor::{JobSupervisor, SupervisorHandle};
use crate::traits::{ArticleRepository, MessageHandler, NotificationBus, ProviderRepository, Subscription};
use crate::types::{AggregatorConfig, AggregatorError, Result, NEW_PROVIDER_TOPIC};
use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for AggregatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatorState::Created => write!(f, "created"),
            AggregatorState::Running => write!(f, "running"),
            AggregatorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Orchestrates the creation and running of aggregation jobs.
///
/// Starts the initial jobs, listens for newly registered providers and starts
/// a job for each of them, and stops every job it started on shutdown.
pub struct Aggregator {
    jobs: Vec<Job>,
    config: AggregatorConfig,
    bus: Arc<dyn NotificationBus>,
    providers: Arc<dyn ProviderRepository>,
    articles: Arc<dyn ArticleRepository>,
    registry: Arc<ProviderRegistry>,
    state: AggregatorState,
    subscription: Option<Subscription>,
    supervisor: SupervisorHandle,
    idle_supervisor: Option<JobSupervisor>,
    supervisor_task: Option<JoinHandle<Vec<JoinHandle<()>>>>,
}

impl Aggregator {
    pub fn new(
        jobs: Vec<Job>,
        config: AggregatorConfig,
        bus: Arc<dyn NotificationBus>,
        providers: Arc<dyn ProviderRepository>,
        articles: Arc<dyn ArticleRepository>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        let (idle_supervisor, supervisor) = JobSupervisor::new();

        Self {
            jobs,
            config,
            bus,
            providers,
            articles,
            registry,
            state: AggregatorState::Created,
            subscription: None,
            supervisor,
            idle_supervisor: Some(idle_supervisor),
            supervisor_task: None,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Subscribe to new provider events, then start the initial jobs.
    ///
    /// Returns once every initial job has been launched. With start delays
    /// enabled each launch waits out its own random delay first, one job
    /// after another. Failing to subscribe is fatal and leaves the
    /// aggregator in the `Created` state.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != AggregatorState::Created {
            return Err(AggregatorError::InvalidState {
                action: "start",
                state: self.state.to_string(),
            });
        }

        info!("Starting Aggregator");

        let handler = Arc::new(NewProviderHandler {
            providers: self.providers.clone(),
            articles: self.articles.clone(),
            registry: self.registry.clone(),
            supervisor: self.supervisor.clone(),
        });
        let subscription = self.bus.subscribe(NEW_PROVIDER_TOPIC, handler).await?;
        self.subscription = Some(subscription);
        self.state = AggregatorState::Running;

        if let Some(supervisor) = self.idle_supervisor.take() {
            self.supervisor_task = Some(tokio::spawn(supervisor.run()));
        }

        let jobs = std::mem::take(&mut self.jobs);
        info!("Launching {} initial jobs", jobs.len());

        for job in jobs {
            if let Some(delay) = self.start_delay() {
                info!("Starting job `{}` in {:?}", job.label(), delay);
                tokio::time::sleep(delay).await;
            }
            self.supervisor.launch(job);
        }

        Ok(())
    }

    /// Unsubscribe from new provider events and signal every job to stop.
    ///
    /// Covers jobs started from notifications as well as the initial ones.
    /// Never waits for a job to finish its current poll; see `wait`.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != AggregatorState::Running {
            return Err(AggregatorError::InvalidState {
                action: "stop",
                state: self.state.to_string(),
            });
        }

        info!("Aggregator stopping");

        if let Some(subscription) = self.subscription.take() {
            let topic = subscription.topic.clone();
            if let Err(e) = self.bus.unsubscribe(subscription).await {
                // keep going, the jobs still have to stop
                error!("Unable to unsubscribe from queue `{}` - {}", topic, e);
            }
        }

        self.supervisor.shutdown();
        self.state = AggregatorState::Stopped;
        Ok(())
    }

    /// Wait until every job loop has exited. Only returns after `stop`.
    pub async fn wait(&mut self) {
        let Some(task) = self.supervisor_task.take() else {
            return;
        };

        let handles = match task.await {
            Ok(handles) => handles,
            Err(e) => {
                error!("Job supervisor failed: {}", e);
                return;
            }
        };

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Job ended abnormally: {}", e);
            }
        }
        info!("All jobs stopped");
    }

    /// Labels of the jobs currently running, initial and discovered alike.
    pub async fn running_jobs(&self) -> Vec<String> {
        self.supervisor.running_jobs().await
    }

    fn start_delay(&self) -> Option<Duration> {
        if !self.config.delay_starts {
            return None;
        }
        let window_ms = self.config.max_start_delay.as_millis() as u64;
        if window_ms == 0 {
            return None;
        }
        Some(Duration::from_millis(rand::rng().random_range(0..window_ms)))
    }
}

/// Starts a job for each provider announced on the new provider topic.
struct NewProviderHandler {
    providers: Arc<dyn ProviderRepository>,
    articles: Arc<dyn ArticleRepository>,
    registry: Arc<ProviderRegistry>,
    supervisor: SupervisorHandle,
}

#[async_trait]
impl MessageHandler for NewProviderHandler {
    async fn handle(&self, payload: Vec<u8>) {
        let provider_id = match String::from_utf8(payload) {
            Ok(id) => id.trim().to_string(),
            Err(e) => {
                error!("Discarding new provider event with malformed payload - {}", e);
                return;
            }
        };
        if provider_id.is_empty() {
            warn!("Discarding new provider event without a provider id");
            return;
        }

        info!("New provider discovered with id `{}`", provider_id);

        if self.supervisor.is_shut_down() {
            warn!("Ignoring provider `{}` - aggregator is stopping", provider_id);
            return;
        }

        let provider = match self.providers.get_provider(&provider_id).await {
            Ok(provider) => provider,
            Err(e) if e.is_not_found() => {
                error!("Unable to find the specified provider - {}", e);
                return;
            }
            Err(e) => {
                error!("Get provider error - {}", e);
                return;
            }
        };

        let job = match build_job(&provider, &self.registry, self.articles.clone()) {
            Ok(job) => job,
            Err(e) => {
                error!("Create new job for provider `{}` - {}", provider.label, e);
                return;
            }
        };

        self.supervisor.launch(job);
    }
}
