pub mod ai_client;
pub mod channels;
pub mod classifier;
pub mod deadline_negotiator;
pub mod decision_service;
pub mod delivery;
pub mod extension_service;
pub mod inbound_service;
pub mod job_handlers;
pub mod message_generator;
pub mod messenger;
pub mod outreach_service;
pub mod pipeline;
pub mod scheduler;
