use anyhow::{Context, Result};
use comb_common::observability::OpsJournal;
use comb_config::{CombConfig, SelectorOverrides};
use comb_drivers::behavioral::{BehavioralEngine, Span};
use comb_drivers::command::CommandChannel;
use comb_drivers::input::InputGateway;
use comb_drivers::input::gateway::{InputSettings, SystemInputGateway};
use comb_drivers::input::socket::SocketChannel;
use comb_drivers::page::exec::{BrowserChannel, ScriptExecutor};
use comb_drivers::page::probe::PageProbe;
use comb_drivers::page::selectors::CommentSelectors;
use comb_harvest::activation::CommentEntryActivator;
use comb_harvest::controller::ScrollTuning;
use comb_harvest::expander::{ReplyExpander, ReplyExpansionHook};
use comb_harvest::{ExhaustiveScroller, HarvestTarget, ScrollHooks, ScrollOptions, ScrollResult};
use std::sync::Arc;
use std::time::Duration;

/// One configured harvest: the scroller, its options and whichever hooks
/// the config enables.
pub struct Harvest {
    scroller: ExhaustiveScroller,
    options: ScrollOptions,
    expand: Option<ReplyExpansionHook>,
    activate: Option<CommentEntryActivator>,
}

impl Harvest {
    pub async fn run(&self) -> comb_common::Result<ScrollResult> {
        let mut hooks = ScrollHooks::none();
        if let Some(expand) = &self.expand {
            hooks = hooks.with_expand(expand);
        }
        if let Some(activate) = &self.activate {
            hooks = hooks.with_activate(activate);
        }
        self.scroller.run(&self.options, hooks).await
    }
}

// helpers
fn merge(slot: &mut Vec<String>, over: &Option<Vec<String>>) {
    if let Some(list) = over {
        *slot = list.clone();
    }
}

pub fn selectors_from(over: &SelectorOverrides) -> CommentSelectors {
    let mut s = CommentSelectors::default();
    merge(&mut s.root, &over.root);
    merge(&mut s.item, &over.item);
    merge(&mut s.end_marker, &over.end_marker);
    merge(&mut s.empty_state, &over.empty_state);
    merge(&mut s.show_more, &over.show_more);
    merge(&mut s.header_total, &over.header_total);
    merge(&mut s.count_badge, &over.count_badge);
    merge(&mut s.captcha, &over.captcha);
    merge(&mut s.media_viewer, &over.media_viewer);
    merge(&mut s.comment_entry, &over.comment_entry);
    merge(&mut s.empty_keywords, &over.empty_keywords);
    s
}

pub fn build_from_config(cfg: &CombConfig) -> Result<Harvest> {
    let selectors = selectors_from(&cfg.harvest.selectors);
    let probe_timeout = Duration::from_millis(cfg.browser.probe_timeout_ms);
    let action_timeout = Duration::from_millis(cfg.browser.action_timeout_ms);

    // -------- page side --------
    let browser = CommandChannel::new(&cfg.browser.endpoint, &cfg.browser.command_path)
        .with_context(|| format!("browser endpoint {}", cfg.browser.endpoint))?
        .with_api_key(cfg.browser.api_key.clone());
    let exec: Arc<dyn ScriptExecutor> = Arc::new(BrowserChannel::new(
        browser,
        cfg.browser.profile.clone(),
        probe_timeout,
    ));
    // The probe locates focus points inside the same band the controller clamps to.
    let tuning = ScrollTuning::default();
    let probe = Arc::new(
        PageProbe::new(exec.clone(), selectors.clone())
            .with_highlight(cfg.diagnostics.highlight)
            .with_band(tuning.band),
    );

    // -------- shared --------
    let pacing = Arc::new(match cfg.harvest.seed {
        Some(seed) => BehavioralEngine::seeded(seed),
        None => BehavioralEngine::new(),
    });
    let journal = Arc::new(OpsJournal::with_capacity(cfg.diagnostics.journal_capacity));

    // -------- input side --------
    let commands = CommandChannel::new(cfg.input_endpoint(), &cfg.input.command_path)
        .with_context(|| format!("input endpoint {}", cfg.input_endpoint()))?
        .with_api_key(cfg.browser.api_key.clone());
    let settings = InputSettings {
        profile_id: cfg.browser.profile.clone(),
        move_steps: cfg.input.move_steps,
        click_delay_ms: cfg.input.click_delay_ms,
        dwell: Span::new(cfg.input.dwell_min_ms, cfg.input.dwell_max_ms),
        action_timeout,
        highlight: cfg.diagnostics.highlight,
        capture_on_click: cfg.diagnostics.capture_on_click,
    };
    let socket = cfg
        .input
        .socket_url
        .as_ref()
        .map(|url| SocketChannel::new(url.clone(), cfg.session_id(), action_timeout));
    let input: Arc<dyn InputGateway> = Arc::new(
        SystemInputGateway::new(
            commands,
            exec.clone(),
            selectors.clone(),
            pacing.clone(),
            journal.clone(),
            settings,
        )
        .with_socket(socket),
    );

    // -------- hooks --------
    let expand = cfg.harvest.expand_replies.then(|| {
        ReplyExpansionHook::new(
            ReplyExpander::new(exec.clone(), selectors.clone()),
            input.clone(),
            pacing.clone(),
        )
        .with_max_clicks(cfg.harvest.max_reply_clicks)
    });
    let activate = cfg.harvest.activate_comments.then(|| {
        CommentEntryActivator::new(exec.clone(), selectors.clone(), input.clone(), pacing.clone())
    });

    let mut options = ScrollOptions::new(HarvestTarget {
        profile: cfg.browser.profile.clone(),
        url: cfg.harvest.target_url.clone(),
    });
    options.max_rounds = cfg.harvest.max_rounds;
    options.root_selectors = selectors.root.clone();

    Ok(Harvest {
        scroller: ExhaustiveScroller::new(probe, input, pacing, journal).with_tuning(tuning),
        options,
        expand,
        activate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use comb_config::CombConfigLoader;

    #[test]
    fn overrides_replace_only_named_lists() {
        let over = SelectorOverrides {
            root: Some(vec![".feed-comments".into()]),
            empty_keywords: Some(vec!["no replies yet".into()]),
            ..Default::default()
        };
        let s = selectors_from(&over);
        let d = CommentSelectors::default();
        assert_eq!(s.root, vec![".feed-comments".to_string()]);
        assert_eq!(s.empty_keywords, vec!["no replies yet".to_string()]);
        assert_eq!(s.item, d.item);
        assert_eq!(s.captcha, d.captcha);
    }

    #[test]
    fn builds_with_hooks_from_yaml() {
        let cfg = CombConfigLoader::new()
            .with_yaml_str(
                r#"
browser:
  endpoint: "http://127.0.0.1:9"
  profile: "alice"
input:
  socket_url: "ws://127.0.0.1:9/ws"
harvest:
  target_url: "https://example.com/explore/1"
  max_rounds: 40
  seed: 7
  activate_comments: false
"#,
            )
            .load()
            .unwrap();
        let harvest = build_from_config(&cfg).unwrap();
        assert_eq!(harvest.options.max_rounds, Some(40));
        assert_eq!(harvest.options.target.profile, "alice");
        assert!(harvest.expand.is_some());
        assert!(harvest.activate.is_none());
    }

    #[test]
    fn bad_endpoint_is_reported() {
        let mut cfg = CombConfig::default();
        cfg.browser.endpoint = "not a url".into();
        let err = build_from_config(&cfg).err().unwrap();
        assert!(format!("{err:#}").contains("not a url"));
    }
}
