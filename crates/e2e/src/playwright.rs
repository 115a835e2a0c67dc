//! Playwright browser automation
//!
//! One long-lived `node` process runs an embedded bridge script that owns a
//! single browser page. Commands go down stdin as one JSON object per line,
//! replies come back the same way on stdout, matched by `id`. Keeping one
//! process keeps the session (cookies, SPA state) alive across the workflow,
//! which a script-per-step approach cannot.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::{E2eError, E2eResult};
use crate::interface::{Interface, NewCategory, Selectors};

/// Navigation and launch get their own budget, independent of readiness waits.
const NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Extra time to wait for a reply beyond the command's own timeout.
const REPLY_GRACE: Duration = Duration::from_secs(5);

const BRIDGE_JS: &str = r#"
const readline = require('readline');
const pw = require('playwright');

let browser = null;
let page = null;

function escapeRe(s) {
  return s.replace(/[.*+?^${}()|[\]\\]/g, '\\$&');
}

function locate(t) {
  let loc = page.locator(t.selector);
  if (t.has_text != null) {
    const text = t.exact ? new RegExp('^\\s*' + escapeRe(t.has_text) + '\\s*$') : t.has_text;
    loc = loc.filter({ hasText: text });
  }
  return t.nth != null ? loc.nth(t.nth) : loc.first();
}

async function handle(cmd) {
  switch (cmd.op) {
    case 'launch': {
      browser = await pw[cmd.browser].launch({ headless: cmd.headless });
      const context = await browser.newContext({ viewport: { width: cmd.width, height: cmd.height } });
      page = await context.newPage();
      return null;
    }
    case 'goto':
      await page.goto(cmd.url, { timeout: cmd.timeout_ms });
      return null;
    case 'wait_for':
      await locate(cmd.target).waitFor({ state: cmd.state, timeout: cmd.timeout_ms });
      return null;
    case 'wait_enabled':
      await page.waitForSelector(cmd.selector + ':not([disabled])', { state: 'visible', timeout: cmd.timeout_ms });
      return null;
    case 'fill': {
      const loc = locate(cmd.target);
      await loc.waitFor({ state: 'visible', timeout: cmd.timeout_ms });
      await loc.fill(cmd.value, { timeout: cmd.timeout_ms });
      return null;
    }
    case 'click': {
      const loc = locate(cmd.target);
      await loc.waitFor({ state: 'visible', timeout: cmd.timeout_ms });
      await loc.click({ timeout: cmd.timeout_ms });
      return null;
    }
    case 'count':
      return await page.locator(cmd.selector).count();
    case 'text_visible':
      return await page.getByText(cmd.text, { exact: true }).first().isVisible();
    case 'url':
      return page.url();
    case 'screenshot':
      await page.screenshot({ path: cmd.path, fullPage: true });
      return cmd.path;
    case 'close':
      if (browser) await browser.close();
      browser = null;
      return null;
    default:
      throw new Error('unknown op: ' + cmd.op);
  }
}

function reply(obj) {
  process.stdout.write(JSON.stringify(obj) + '\n');
}

(async () => {
  const rl = readline.createInterface({ input: process.stdin, crlfDelay: Infinity });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (e) {
      reply({ id: null, ok: false, error: 'bad command: ' + e.message });
      continue;
    }
    try {
      const value = await handle(cmd);
      reply({ id: cmd.id, ok: true, value: value === undefined ? null : value });
    } catch (e) {
      reply({ id: cmd.id, ok: false, error: e.message, timeout: e.name === 'TimeoutError' });
    }
    if (cmd.op === 'close') break;
  }
  if (browser) await browser.close();
  process.exit(0);
})();
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
}

/// Element address understood by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Target {
    selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_text: Option<String>,
    /// Match `has_text` against the whole visible label
    exact: bool,
    /// Negative counts from the end
    #[serde(skip_serializing_if = "Option::is_none")]
    nth: Option<i64>,
}

impl Target {
    fn css(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            has_text: None,
            exact: false,
            nth: None,
        }
    }

    fn with_text(mut self, text: &str, exact: bool) -> Self {
        self.has_text = Some(text.to_string());
        self.exact = exact;
        self
    }

    fn nth(mut self, index: i64) -> Self {
        self.nth = Some(index);
        self
    }

    fn describe(&self) -> String {
        match (&self.has_text, self.nth) {
            (Some(text), _) => format!("{} with text '{}'", self.selector, text),
            (None, Some(n)) => format!("{} [{}]", self.selector, n),
            (None, None) => self.selector.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand {
    Launch {
        browser: Browser,
        headless: bool,
        width: u32,
        height: u32,
    },
    Goto {
        url: String,
        timeout_ms: u64,
    },
    WaitFor {
        target: Target,
        state: WaitState,
        timeout_ms: u64,
    },
    WaitEnabled {
        selector: String,
        timeout_ms: u64,
    },
    Fill {
        target: Target,
        value: String,
        timeout_ms: u64,
    },
    Click {
        target: Target,
        timeout_ms: u64,
    },
    Count {
        selector: String,
    },
    TextVisible {
        text: String,
    },
    Url,
    Screenshot {
        path: PathBuf,
    },
    Close,
}

impl BridgeCommand {
    fn describe(&self) -> String {
        match self {
            BridgeCommand::Launch { browser, .. } => format!("launch:{}", browser.as_str()),
            BridgeCommand::Goto { url, .. } => format!("navigate:{}", url),
            BridgeCommand::WaitFor { target, .. } => format!("wait:{}", target.describe()),
            BridgeCommand::WaitEnabled { selector, .. } => format!("enabled:{}", selector),
            BridgeCommand::Fill { target, .. } => format!("fill:{}", target.describe()),
            BridgeCommand::Click { target, .. } => format!("click:{}", target.describe()),
            BridgeCommand::Count { selector } => format!("count:{}", selector),
            BridgeCommand::TextVisible { text } => format!("text:{}", text),
            BridgeCommand::Url => "url".to_string(),
            BridgeCommand::Screenshot { path } => format!("screenshot:{}", path.display()),
            BridgeCommand::Close => "close".to_string(),
        }
    }

    fn timeout_ms(&self) -> u64 {
        match self {
            BridgeCommand::WaitFor { timeout_ms, .. }
            | BridgeCommand::WaitEnabled { timeout_ms, .. }
            | BridgeCommand::Fill { timeout_ms, .. }
            | BridgeCommand::Click { timeout_ms, .. }
            | BridgeCommand::Goto { timeout_ms, .. } => *timeout_ms,
            _ => NAVIGATION_TIMEOUT_MS,
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

impl Reply {
    fn into_result(self, command: &BridgeCommand) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.value);
        }
        if self.timeout {
            return Err(E2eError::UiTimeout {
                target: command.describe(),
                timeout_ms: command.timeout_ms(),
            });
        }
        Err(E2eError::Playwright(format!(
            "{} failed: {}",
            command.describe(),
            self.error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

/// Configuration for the Playwright driver
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub login_url: String,
    pub dashboard_url: String,
    pub selectors: Selectors,
    pub screenshot_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
    pub readiness_timeout_ms: u64,
}

impl PlaywrightConfig {
    pub fn from_workflow(config: &WorkflowConfig) -> Self {
        Self {
            login_url: config.login_url(),
            dashboard_url: config.dashboard_url(),
            selectors: config.selectors.clone(),
            screenshot_dir: config.output_dir.join("screenshots"),
            viewport_width: config.browser.viewport_width,
            viewport_height: config.browser.viewport_height,
            browser: config.browser.engine,
            headless: config.browser.headless,
            readiness_timeout_ms: config.timeouts.readiness_ms,
        }
    }
}

/// Playwright-backed [`Interface`]
pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    config: PlaywrightConfig,
    // Holds bridge.js alive for the life of the node process
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Start node with the bridge and launch the browser
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        std::fs::create_dir_all(&config.screenshot_dir)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_JS)?;

        // The script lives in a temp dir, so point node at the caller's modules
        let cwd = std::env::current_dir()?;
        let mut node_path = cwd.join("node_modules").into_os_string();
        if let Some(existing) = std::env::var_os("NODE_PATH") {
            node_path.push(if cfg!(windows) { ";" } else { ":" });
            node_path.push(existing);
        }

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .env("NODE_PATH", node_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".to_string()))?;

        let mut driver = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            config,
            _script_dir: script_dir,
        };

        driver
            .call(BridgeCommand::Launch {
                browser: driver.config.browser,
                headless: driver.config.headless,
                width: driver.config.viewport_width,
                height: driver.config.viewport_height,
            })
            .await?;

        info!("Launched {} (headless: {})", driver.config.browser.as_str(), driver.config.headless);
        Ok(driver)
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn call(&mut self, command: BridgeCommand) -> E2eResult<Value> {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&Request { id, command: &command })?;
        line.push('\n');
        debug!("→ {}", command.describe());

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let wait = Duration::from_millis(command.timeout_ms()) + REPLY_GRACE;
        let reply = tokio::time::timeout(wait, self.read_reply(id))
            .await
            .map_err(|_| E2eError::Playwright(format!("bridge did not answer {}", command.describe())))??;

        reply.into_result(&command)
    }

    async fn read_reply(&mut self, id: u64) -> E2eResult<Reply> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Playwright("bridge exited".to_string()))?;

            match serde_json::from_str::<Reply>(&line) {
                Ok(reply) if reply.id == Some(id) => return Ok(reply),
                Ok(reply) if reply.id.is_none() => {
                    return Err(E2eError::Playwright(reply.error.unwrap_or_else(|| "malformed command".to_string())));
                }
                Ok(reply) => warn!("Dropping stale bridge reply {:?}", reply.id),
                Err(_) => debug!("bridge: {}", line),
            }
        }
    }

    fn readiness(&self) -> u64 {
        self.config.readiness_timeout_ms
    }

    async fn wait_visible(&mut self, target: Target) -> E2eResult<()> {
        let timeout_ms = self.readiness();
        self.call(BridgeCommand::WaitFor {
            target,
            state: WaitState::Visible,
            timeout_ms,
        })
        .await
        .map(|_| ())
    }

    /// Like `wait_visible`, but a timeout means "not there"
    async fn appears(&mut self, target: Target) -> E2eResult<bool> {
        match self.wait_visible(target).await {
            Ok(()) => Ok(true),
            Err(E2eError::UiTimeout { target, .. }) => {
                debug!("Not visible in time: {}", target);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn fill(&mut self, target: Target, value: &str) -> E2eResult<()> {
        let timeout_ms = self.readiness();
        self.call(BridgeCommand::Fill {
            target,
            value: value.to_string(),
            timeout_ms,
        })
        .await
        .map(|_| ())
    }

    async fn click(&mut self, target: Target) -> E2eResult<()> {
        let timeout_ms = self.readiness();
        self.call(BridgeCommand::Click { target, timeout_ms }).await.map(|_| ())
    }

    /// Jump to the final results page; the trailing page link is "next"
    async fn go_to_last_page(&mut self) -> E2eResult<()> {
        let selector = self.config.selectors.page_link.clone();
        let links = self
            .call(BridgeCommand::Count {
                selector: selector.clone(),
            })
            .await?
            .as_u64()
            .unwrap_or(0);

        if links >= 2 {
            self.click(Target::css(&selector).nth(-2)).await?;
        } else {
            debug!("No pagination rendered, staying on the only page");
        }
        Ok(())
    }
}

#[async_trait]
impl Interface for PlaywrightDriver {
    async fn navigate_to_login(&mut self) -> E2eResult<()> {
        let url = self.config.login_url.clone();
        self.call(BridgeCommand::Goto {
            url,
            timeout_ms: NAVIGATION_TIMEOUT_MS,
        })
        .await?;
        Ok(())
    }

    async fn login_page_ready(&mut self) -> E2eResult<bool> {
        let s = self.config.selectors.clone();
        for selector in [&s.login_header, &s.email_input, &s.password_input, &s.login_submit] {
            if !self.appears(Target::css(selector)).await? {
                return Ok(false);
            }
        }
        Ok(self.current_location().await? == self.config.login_url)
    }

    async fn submit_login(&mut self, email: &str, password: &str) -> E2eResult<()> {
        let s = self.config.selectors.clone();
        self.fill(Target::css(&s.email_input), email).await?;
        self.fill(Target::css(&s.password_input), password).await?;
        self.click(Target::css(&s.login_submit)).await
    }

    async fn is_authenticated_landing_visible(&mut self) -> E2eResult<bool> {
        let nav = Target::css(&self.config.selectors.category_nav_link);
        if !self.appears(nav).await? {
            return Ok(false);
        }
        Ok(self.current_location().await? == self.config.dashboard_url)
    }

    async fn open_categories(&mut self) -> E2eResult<()> {
        let nav = Target::css(&self.config.selectors.category_nav_link);
        self.click(nav).await
    }

    async fn create_category(&mut self, category: &NewCategory) -> E2eResult<()> {
        let s = self.config.selectors.clone();
        debug!("Creating {:?}", category);

        self.click(Target::css(&s.add_category_button)).await?;
        self.fill(Target::css(&s.category_name_input), &category.name).await?;

        if let Some(parent) = &category.parent {
            self.click(Target::css(&s.subcategory_toggle).with_text(&s.subcategory_toggle_text, false))
                .await?;
            self.fill(Target::css(&s.parent_autocomplete_input), parent).await?;
            // Suggestions share prefixes ("Category ab3f9" vs "Category ab3f90")
            self.click(Target::css(&s.parent_option_label).with_text(parent, true))
                .await?;
        }

        let timeout_ms = self.readiness();
        self.call(BridgeCommand::WaitEnabled {
            selector: s.confirm_button.clone(),
            timeout_ms,
        })
        .await?;
        self.click(Target::css(&s.confirm_button)).await
    }

    async fn is_category_visible_in_list(&mut self, name: &str) -> E2eResult<bool> {
        self.go_to_last_page().await?;
        let visible = self
            .call(BridgeCommand::TextVisible {
                text: name.to_string(),
            })
            .await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn current_location(&mut self) -> E2eResult<String> {
        let url = self.call(BridgeCommand::Url).await?;
        Ok(url.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&mut self, name: &str) -> E2eResult<Option<PathBuf>> {
        let path = self.config.screenshot_dir.join(format!("{}.png", name));
        self.call(BridgeCommand::Screenshot { path: path.clone() }).await?;
        Ok(Some(path))
    }

    async fn close(&mut self) -> E2eResult<()> {
        if let Err(e) = self.call(BridgeCommand::Close).await {
            warn!("Bridge close failed: {}", e);
        }
        match tokio::time::timeout(REPLY_GRACE, self.child.wait()).await {
            Ok(status) => {
                debug!("Bridge exited: {:?}", status?);
            }
            Err(_) => {
                warn!("Bridge did not exit, killing it");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}
