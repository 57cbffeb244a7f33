pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use crate::config::AutomationSettings;
use crate::services::{
    ai_client::AiCompleter,
    channels::Channels,
    classifier::ResponseClassifier,
    deadline_negotiator::DeadlineNegotiator,
    decision_service::DecisionService,
    extension_service::ExtensionService,
    inbound_service::InboundService,
    job_handlers::{default_registry, HandlerContext},
    message_generator::MessageGenerator,
    messenger::CandidateMessenger,
    outreach_service::OutreachService,
    scheduler::{JobScheduler, PacingPolicy, RetryPolicy},
};
use crate::store::Stores;
use std::sync::Arc;

/// Secrets the HTTP guards check against.
#[derive(Debug, Clone)]
pub struct AuthSecrets {
    pub jwt_secret: String,
    pub cron_secret: Option<String>,
    pub telegram_secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub settings: AutomationSettings,
    pub auth: AuthSecrets,
    pub generator: MessageGenerator,
    pub scheduler: JobScheduler,
    pub outreach: OutreachService,
    pub decisions: DecisionService,
    pub extensions: ExtensionService,
    pub inbound: InboundService,
}

impl AppState {
    pub fn new(
        stores: Stores,
        ai: Arc<dyn AiCompleter>,
        channels: Channels,
        settings: AutomationSettings,
        auth: AuthSecrets,
    ) -> Self {
        let pacing = PacingPolicy::fixed(settings.send_delay);
        let generator = MessageGenerator::new(ai.clone());
        let messenger = CandidateMessenger::new(stores.conversations.clone(), channels);

        let registry = default_registry(HandlerContext {
            stores: stores.clone(),
            generator: generator.clone(),
            messenger: messenger.clone(),
            settings: settings.clone(),
        });
        let scheduler = JobScheduler::new(
            stores.jobs.clone(),
            registry,
            pacing,
            RetryPolicy {
                max_retries: settings.job_max_retries,
                base_backoff: settings.job_retry_backoff,
            },
            settings.external_call_timeout,
        );
        let outreach = OutreachService::new(
            stores.clone(),
            messenger.clone(),
            pacing,
            settings.external_call_timeout,
        );
        let decisions = DecisionService::new(
            stores.clone(),
            generator.clone(),
            messenger.clone(),
            settings.clone(),
        );
        let extensions = ExtensionService::new(
            stores.candidates.clone(),
            DeadlineNegotiator::new(ai.clone(), settings.max_extension_days),
            messenger,
            settings.clone(),
        );
        let inbound = InboundService::new(
            stores.clone(),
            ResponseClassifier::new(ai),
            extensions.clone(),
        );

        Self {
            stores,
            settings,
            auth,
            generator,
            scheduler,
            outreach,
            decisions,
            extensions,
            inbound,
        }
    }
}
