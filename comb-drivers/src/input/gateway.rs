use async_trait::async_trait;
use comb_common::observability::OpsJournal;
use comb_common::Result;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::guard::{assess_click, assess_wheel, PageGuard};
use super::socket::SocketChannel;
use super::{InputGateway, InteractionContext};
use crate::behavioral::{BehavioralEngine, Span};
use crate::command::CommandChannel;
use crate::page::exec::{run_script, ScriptExecutor};
use crate::page::geometry::FocusPoint;
use crate::page::scripts;
use crate::page::selectors::CommentSelectors;

const HIGHLIGHT_TTL_MS: u64 = 900;

#[derive(Debug, Clone)]
pub struct InputSettings {
    /// Browser profile the input service should target.
    pub profile_id: String,
    pub move_steps: u32,
    /// Press-to-release delay the service applies inside a click.
    pub click_delay_ms: u64,
    /// Pause between arriving over a target and clicking it.
    pub dwell: Span,
    pub action_timeout: Duration,
    pub highlight: bool,
    pub capture_on_click: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            profile_id: "default".to_string(),
            move_steps: 3,
            click_delay_ms: 40,
            dwell: Span::new(80, 220),
            action_timeout: Duration::from_millis(12_000),
            highlight: true,
            capture_on_click: false,
        }
    }
}

/// [`InputGateway`] backed by the OS-level input service.
///
/// The page itself is only read (guard, highlight and capture go through the
/// script channel); every pointer event is a real one.
pub struct SystemInputGateway {
    commands: CommandChannel,
    page: Arc<dyn ScriptExecutor>,
    selectors: CommentSelectors,
    socket: Option<SocketChannel>,
    pacing: Arc<BehavioralEngine>,
    journal: Arc<OpsJournal>,
    settings: InputSettings,
}

impl SystemInputGateway {
    pub fn new(
        commands: CommandChannel,
        page: Arc<dyn ScriptExecutor>,
        selectors: CommentSelectors,
        pacing: Arc<BehavioralEngine>,
        journal: Arc<OpsJournal>,
        settings: InputSettings,
    ) -> Self {
        Self {
            commands,
            page,
            selectors,
            socket: None,
            pacing,
            journal,
            settings,
        }
    }

    pub fn with_socket(mut self, socket: Option<SocketChannel>) -> Self {
        self.socket = socket;
        self
    }

    async fn send(&self, action: &'static str, args: Value) -> Result<()> {
        let body = json!({ "action": action, "args": args });
        self.commands
            .send(action, &body, self.settings.action_timeout)
            .await
            .map(|_| ())
    }

    /// `None` when the guard probe itself fails; the action then proceeds unguarded.
    async fn observe_guard(&self, point: Option<FocusPoint>) -> Option<PageGuard> {
        let script = scripts::page_guard(&self.selectors, point.map(|p| (p.x, p.y)));
        match run_script::<PageGuard>(self.page.as_ref(), &script).await {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(target: "input.guard", error = %e, "guard probe failed; proceeding unguarded");
                None
            }
        }
    }

    fn point_args(&self, point: Option<FocusPoint>) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("profileId".into(), json!(self.settings.profile_id));
        if let Some(p) = point {
            let (x, y) = p.rounded();
            args.insert("x".into(), json!(x));
            args.insert("y".into(), json!(y));
        }
        args
    }

    /// Highlight and capture; never fails.
    async fn diagnostics(&self, point: FocusPoint, context: InteractionContext) {
        if self.settings.highlight {
            let script = scripts::highlight_point(&self.selectors, point.x, point.y, HIGHLIGHT_TTL_MS);
            if let Err(e) = self.page.execute(&script).await {
                debug!(target: "input.click", error = %e, "highlight failed");
            }
        }
        if self.settings.capture_on_click {
            match self.page.capture_screenshot().await {
                Ok(Some(image)) => {
                    self.journal
                        .record("capture", format!("{} {} bytes", context.label(), image.len()));
                }
                Ok(None) => {}
                Err(e) => debug!(target: "input.click", error = %e, "capture failed"),
            }
        }
    }
}

#[async_trait]
impl InputGateway for SystemInputGateway {
    async fn hover(&self, point: FocusPoint) -> Result<()> {
        let mut args = self.point_args(Some(point));
        args.insert("steps".into(), json!(self.settings.move_steps));
        self.send("mouse:move", Value::Object(args)).await?;
        let (x, y) = point.rounded();
        self.journal.record("mouse:move", format!("({x},{y})"));
        Ok(())
    }

    async fn click(&self, point: FocusPoint, context: InteractionContext) -> Result<()> {
        if let Some(guard) = self.observe_guard(Some(point)).await {
            if let Err(e) = assess_click(&guard, context) {
                warn!(target: "input.click", context = context.label(), error = %e, "click refused");
                self.journal.record("policy", e.to_string());
                return Err(e);
            }
        }
        self.hover(point).await?;
        let dwell = self.pacing.random_delay(self.settings.dwell).await;
        self.diagnostics(point, context).await;

        let mut args = self.point_args(Some(point));
        args.insert("clicks".into(), json!(1));
        args.insert("delay".into(), json!(self.settings.click_delay_ms));
        self.send("mouse:click", Value::Object(args)).await?;

        let (x, y) = point.rounded();
        info!(target: "input.click", context = context.label(), x, y, dwell, "click");
        self.journal
            .record("mouse:click", format!("{} ({x},{y}) dwell={dwell}ms", context.label()));
        Ok(())
    }

    async fn wheel(
        &self,
        delta_y: i64,
        focus: Option<FocusPoint>,
        context: InteractionContext,
    ) -> Result<()> {
        if let Some(guard) = self.observe_guard(None).await {
            if let Err(e) = assess_wheel(&guard, context) {
                warn!(target: "input.wheel", context = context.label(), error = %e, "wheel refused");
                self.journal.record("policy", e.to_string());
                return Err(e);
            }
        }
        if let Some(point) = focus {
            if let Err(e) = self.hover(point).await {
                debug!(target: "input.wheel", error = %e, "pre-wheel hover failed");
            }
        }

        let mut args = self.point_args(focus);
        args.insert("deltaX".into(), json!(0));
        args.insert("deltaY".into(), json!(delta_y));
        let direct = self.send("mouse:wheel", Value::Object(args)).await;
        let err = match direct {
            Ok(()) => {
                debug!(target: "input.wheel", context = context.label(), delta_y, "wheel");
                self.journal
                    .record("mouse:wheel", format!("{} dy={delta_y}", context.label()));
                return Ok(());
            }
            Err(e) if e.is_policy_violation() => return Err(e),
            Err(e) => e,
        };
        let Some(socket) = &self.socket else {
            return Err(err);
        };
        warn!(
            target: "input.wheel",
            error = %err,
            socket = socket.url(),
            "direct wheel failed; using socket fallback"
        );
        socket.scroll(delta_y, focus).await?;
        self.journal
            .record("socket:scroll", format!("{} dy={delta_y}", context.label()));
        Ok(())
    }
}
