//! Composition root: the health endpoint, the guide flow and the chat
//! listener, each running as a supervised task.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use channel_plugin::plugin::ChannelPlugin;
use channel_slack::SlackPlugin;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    agent::manager::build_generator,
    channel::{AcknowledgeHandler, ChannelListener},
    config::{AppSettings, ConfigManager},
    flow::{FlowInput, GuideCreatorFlow},
    health::HealthServer,
    logger::FileTelemetry,
    supervisor::{Supervisor, TaskExit},
};

pub const HEALTH_TASK: &str = "health";
pub const FLOW_TASK: &str = "flow";
pub const LISTENER_TASK: &str = "listener";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct App {
    config: ConfigManager,
    settings: AppSettings,
    telemetry: FileTelemetry,
    health: HealthServer,
    channel: Option<Box<dyn ChannelPlugin>>,
}

impl App {
    /// Bind the health endpoint. Nothing else starts until [`App::run`].
    pub async fn bind(config: ConfigManager, settings: AppSettings, telemetry: FileTelemetry) -> Result<Self> {
        let health = HealthServer::bind(settings.health_addr)
            .await
            .context("could not start the health endpoint")?;
        Ok(Self { config, settings, telemetry, health, channel: None })
    }

    /// Listen on `plugin` instead of Slack.
    pub fn with_channel(mut self, plugin: Box<dyn ChannelPlugin>) -> Self {
        self.channel = Some(plugin);
        self
    }

    pub fn health_addr(&self) -> SocketAddr {
        self.health.local_addr()
    }

    /// Run until Ctrl-C or until the health endpoint fails.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received");
        })
        .await
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let App { config, settings, telemetry, health, channel } = self;
        let channel = match channel {
            Some(channel) => channel,
            None => slack_plugin(&config).await,
        };

        let mut supervisor = Supervisor::new();
        let token = supervisor.token();

        info!(addr = %health.local_addr(), "health endpoint listening");
        let health_token = token.clone();
        supervisor.spawn(HEALTH_TASK, async move {
            health.serve(health_token).await?;
            Ok(())
        });
        supervisor.spawn(FLOW_TASK, run_flow(config, settings, telemetry, token.clone()));
        supervisor.spawn(LISTENER_TASK, run_listener(channel, token));

        tokio::pin!(shutdown);
        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                report = supervisor.next_report() => {
                    let Some(report) = report else { break };
                    match &report.exit {
                        TaskExit::Failed(reason) if report.name == HEALTH_TASK => {
                            error!(task = %report.name, error = %reason, "health endpoint died, shutting down");
                            result = Err(anyhow!("health endpoint failed: {reason}"));
                            break;
                        }
                        TaskExit::Failed(reason) => {
                            error!(task = %report.name, error = %reason, "task failed, the rest keeps running");
                        }
                        _ => info!("{report}"),
                    }
                }
            }
        }

        info!("shutting down");
        for report in supervisor.shutdown(SHUTDOWN_GRACE).await {
            info!("{report}");
        }
        result
    }
}

/// A Slack plugin fed with the keys it asks for.
pub async fn slack_plugin(config: &ConfigManager) -> Box<dyn ChannelPlugin> {
    let mut plugin = SlackPlugin::default();
    let plugin_config = config.subset(&plugin.list_config()).await;
    let plugin_secrets = config.subset(&plugin.list_secrets()).await;
    plugin.set_config(plugin_config);
    plugin.set_secrets(plugin_secrets);
    Box::new(plugin)
}

async fn run_flow(
    config: ConfigManager,
    settings: AppSettings,
    telemetry: FileTelemetry,
    shutdown: CancellationToken,
) -> Result<()> {
    let work = async move {
        let input = settings.topic.map(|topic| FlowInput::new(topic, settings.audience_level));
        let generator = match input {
            Some(_) => Some(
                build_generator(&config)
                    .await
                    .context("could not set up the content generator")?,
            ),
            None => None,
        };

        let mut flow = GuideCreatorFlow::new(generator, settings.output_dir).with_telemetry(telemetry);
        let outcome = flow.kickoff(input).await.context("guide creator flow failed")?;
        match outcome.guide_path {
            Some(path) => info!(path = %path.display(), "guide written"),
            None => info!("no topic configured, flow idle"),
        }
        Ok(())
    };

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("flow interrupted by shutdown");
            Ok(())
        }
        result = work => result,
    }
}

async fn run_listener(channel: Box<dyn ChannelPlugin>, shutdown: CancellationToken) -> Result<()> {
    let stats = ChannelListener::new(channel, Arc::new(AcknowledgeHandler))
        .run(shutdown)
        .await?;
    info!(received = stats.received, replied = stats.replied, "listener finished");
    Ok(())
}
