// canbus-setup/src/menu.rs
//
// The interactive, menu-driven session.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Interactive menus.
//!
//! The session is a stack of [`Screen`]s. The screen on top of the stack is
//! shown, and its handler returns a [`Transition`] saying what to show
//! next. Anything chosen along the way, like the scheme and parameters in
//! the setup flow, is carried inside the screens themselves.
//!
//! ```text
//! Main ─┬─ Setup ── Bitrate ── TxQueueLen ── Confirm
//!       ├─ Link
//!       ├─ Troubleshoot ── Action(...)
//!       └─ Action(Validate | ViewFiles | Status | Remove)
//! ```
//!
//! A failing operation is reported and the session returns to the menu the
//! operation was started from. The session only ends when the operator asks
//! for it, or when the input runs out.

use crate::{
    apply::{apply_configuration, remove_configuration, Activation},
    config::Config,
    dump::{Frame, Summary},
    errors::{Error, Result},
    extract::extract_parameters,
    link::LinkStatus,
    params::{Bitrate, DesiredParameters, TxQueueLen},
    scheme::{detect, Detection, Scheme},
    system::{PackageOp, System, NETWORKD},
    uuid::parse_uuids,
};
use std::io::{BufRead, Write};

/// The package with the CAN command line utilities.
pub const CAN_UTILS: &str = "can-utils";

/// Frames to wait for in a sampled capture.
const SAMPLE_FRAMES: u32 = 100;
/// How long to wait for a sampled capture, in milliseconds.
const SAMPLE_TIMEOUT_MS: u32 = 3000;
/// The frame sent when the operator doesn't give one.
const TEST_FRAME: &str = "123#DEADBEEF";

/// A single operation that runs and then returns to its menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Check the installed configuration against the files and the link
    Validate,
    /// Print the installed configuration files
    ViewFiles,
    /// Print the live link status
    Status,
    /// Bring the interface up
    LinkUp,
    /// Bring the interface down
    LinkDown,
    /// Report whether the CAN tools are installed
    CheckTools,
    /// Install can-utils
    InstallTools,
    /// Show bus traffic until interrupted
    LiveCapture,
    /// Capture some traffic and summarize it
    SampleCapture,
    /// Send a single frame
    SendFrame,
    /// List the Klipper nodes waiting for assignment
    QueryUuids,
    /// Remove every configuration
    Remove,
}

/// Something the session can show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// The top-level menu
    Main,
    /// Pick a configuration scheme
    Setup,
    /// Pick a bitrate for the scheme
    Bitrate(Scheme),
    /// Pick a queue length for the scheme and bitrate
    TxQueueLen(Scheme, Bitrate),
    /// Confirm and apply the choices
    Confirm(Scheme, DesiredParameters),
    /// Bring the interface up or down
    Link,
    /// The troubleshooting menu
    Troubleshoot,
    /// Run an operation
    Action(Action),
}

/// What to show after a screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Show the same screen again
    Stay,
    /// Show a new screen, returning here afterwards
    Push(Screen),
    /// Show a new screen instead of this one
    Replace(Screen),
    /// Go back to the previous screen
    Pop,
    /// Go back to the main menu
    Home,
    /// End the session
    Exit,
}

/// The navigation stack.
#[derive(Debug)]
pub struct MenuStack(Vec<Screen>);

impl Default for MenuStack {
    fn default() -> Self {
        Self(vec![Screen::Main])
    }
}

impl MenuStack {
    /// The screen currently shown, if the session hasn't ended.
    pub fn top(&self) -> Option<&Screen> {
        self.0.last()
    }

    /// How many screens deep the session is.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Applies a transition.
    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Stay => (),
            Transition::Push(screen) => self.0.push(screen),
            Transition::Replace(screen) => {
                self.0.pop();
                self.0.push(screen);
            }
            Transition::Pop => {
                self.0.pop();
            }
            Transition::Home => self.0.truncate(1),
            Transition::Exit => self.0.clear(),
        }
    }

    /// Returns to the enclosing menu after a failure.
    ///
    /// The main menu is never left this way.
    pub fn unwind(&mut self) {
        if self.0.len() > 1 {
            self.0.pop();
        }
    }
}

// ===== Console =====

/// An operator's answer to a menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    /// One of the items, counting from zero
    Pick(usize),
    /// Go back
    Back,
    /// Leave the program
    Quit,
}

/// The operator's terminal.
#[derive(Debug)]
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    /// Creates a console reading from `input` and writing to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Consumes the console, returning the output.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Shows a prompt and reads a line, trimmed.
    ///
    /// Returns `None` when the input is exhausted.
    fn prompt(&mut self, msg: &str) -> Result<Option<String>> {
        write!(self.output, "{}", msg)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Asks a yes/no question, defaulting to "no".
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.prompt(&format!("{} [y/N]: ", question))?;
        Ok(matches!(
            answer.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("y" | "yes")
        ))
    }

    /// Shows a numbered menu and reads a choice.
    ///
    /// Asks again until the answer is valid. End of input quits.
    fn menu<S: AsRef<str>>(&mut self, title: &str, items: &[S], back: &str) -> Result<Input> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", title)?;
        for (i, item) in items.iter().enumerate() {
            writeln!(self.output, "  {}) {}", i + 1, item.as_ref())?;
        }
        writeln!(self.output, "  0) {}", back)?;
        writeln!(self.output, "  q) Quit")?;

        loop {
            let answer = match self.prompt("> ")? {
                Some(answer) => answer,
                None => return Ok(Input::Quit),
            };
            match answer.as_str() {
                "0" => return Ok(Input::Back),
                "q" | "Q" => return Ok(Input::Quit),
                s => match s.parse::<usize>() {
                    Ok(n) if (1..=items.len()).contains(&n) => return Ok(Input::Pick(n - 1)),
                    _ => writeln!(self.output, "Invalid choice '{}'", s)?,
                },
            }
        }
    }
}

// ===== Session =====

/// An interactive session.
#[derive(Debug)]
pub struct Session<S, R, W> {
    sys: S,
    config: Config,
    console: Console<R, W>,
}

impl<S: System, R: BufRead, W: Write> Session<S, R, W> {
    /// Creates a session.
    pub fn new(sys: S, config: Config, console: Console<R, W>) -> Self {
        Self {
            sys,
            config,
            console,
        }
    }

    /// Consumes the session, returning the system and console.
    pub fn into_parts(self) -> (S, Console<R, W>) {
        (self.sys, self.console)
    }

    /// Runs the menus until the operator exits.
    ///
    /// Only an error writing to the console ends the session early.
    pub fn run(&mut self) -> Result<()> {
        let mut stack = MenuStack::default();

        while let Some(screen) = stack.top().cloned() {
            match self.show(&screen) {
                Ok(transition) => stack.apply(transition),
                Err(err) => {
                    log::debug!("{:?} failed: {:?}", screen, err);
                    writeln!(self.console.output, "Error: {}", err)?;
                    stack.unwind();
                }
            }
        }
        writeln!(self.console.output, "Bye.")?;
        Ok(())
    }

    fn show(&mut self, screen: &Screen) -> Result<Transition> {
        match screen {
            Screen::Main => self.main_menu(),
            Screen::Setup => self.setup_menu(),
            Screen::Bitrate(scheme) => self.bitrate_menu(*scheme),
            Screen::TxQueueLen(scheme, bitrate) => self.txqueuelen_menu(*scheme, *bitrate),
            Screen::Confirm(scheme, params) => self.confirm_apply(*scheme, params),
            Screen::Link => self.link_menu(),
            Screen::Troubleshoot => self.troubleshoot_menu(),
            Screen::Action(action) => {
                self.perform(*action)?;
                Ok(Transition::Pop)
            }
        }
    }

    /// Maps a menu answer to a transition.
    fn navigate<F>(input: Input, pick: F) -> Transition
    where
        F: FnOnce(usize) -> Transition,
    {
        match input {
            Input::Pick(n) => pick(n),
            Input::Back => Transition::Pop,
            Input::Quit => Transition::Exit,
        }
    }

    fn main_menu(&mut self) -> Result<Transition> {
        let detection = detect(&self.config.layout());
        let title = format!(
            "CAN interface '{}': {}{}",
            self.config.iface,
            if detection.is_warning() { "WARNING: " } else { "" },
            detection
        );

        let items = [
            "Set up the CAN interface",
            "Validate the configuration",
            "View the configuration files",
            "Show the interface status",
            "Bring the interface up/down",
            "Troubleshooting",
            "Remove the configuration",
        ];
        let input = self.console.menu(&title, &items[..], "Exit")?;

        Ok(match input {
            Input::Pick(0) => Transition::Push(Screen::Setup),
            Input::Pick(1) => Transition::Push(Screen::Action(Action::Validate)),
            Input::Pick(2) => Transition::Push(Screen::Action(Action::ViewFiles)),
            Input::Pick(3) => Transition::Push(Screen::Action(Action::Status)),
            Input::Pick(4) => Transition::Push(Screen::Link),
            Input::Pick(5) => Transition::Push(Screen::Troubleshoot),
            Input::Pick(_) => Transition::Push(Screen::Action(Action::Remove)),
            Input::Back | Input::Quit => Transition::Exit,
        })
    }

    fn setup_menu(&mut self) -> Result<Transition> {
        let detection = detect(&self.config.layout());
        if detection != Detection::Unknown {
            writeln!(
                self.console.output,
                "Currently installed: {}. It will be replaced.",
                detection
            )?;
        }

        let items = Scheme::ALL
            .iter()
            .map(|s| format!("{} - {}", s, s.description()))
            .collect::<Vec<_>>();
        let input = self.console.menu("Configuration method:", &items, "Back")?;

        Ok(Self::navigate(input, |n| {
            Transition::Push(Screen::Bitrate(Scheme::ALL[n]))
        }))
    }

    fn bitrate_menu(&mut self, scheme: Scheme) -> Result<Transition> {
        let choices = Bitrate::all().collect::<Vec<_>>();
        let items = choices
            .iter()
            .map(|b| recommended(b, *b == Bitrate::DEFAULT))
            .collect::<Vec<_>>();
        let input = self.console.menu("Bitrate (bits/s):", &items, "Back")?;

        Ok(Self::navigate(input, |n| {
            Transition::Push(Screen::TxQueueLen(scheme, choices[n]))
        }))
    }

    fn txqueuelen_menu(&mut self, scheme: Scheme, bitrate: Bitrate) -> Result<Transition> {
        let choices = TxQueueLen::all().collect::<Vec<_>>();
        let items = choices
            .iter()
            .map(|q| recommended(q, *q == TxQueueLen::DEFAULT))
            .collect::<Vec<_>>();
        let input = self.console.menu("Transmit queue length:", &items, "Back")?;

        Ok(Self::navigate(input, |n| {
            Transition::Push(Screen::Confirm(
                scheme,
                DesiredParameters::new(bitrate, choices[n]),
            ))
        }))
    }

    fn confirm_apply(&mut self, scheme: Scheme, params: &DesiredParameters) -> Result<Transition> {
        let layout = self.config.layout();
        let out = &mut self.console.output;

        writeln!(out)?;
        writeln!(
            out,
            "Configure '{}' using {}:",
            layout.iface(),
            scheme.description()
        )?;
        writeln!(out, "  bitrate:    {}", params.bitrate)?;
        writeln!(out, "  txqueuelen: {}", params.txqueuelen)?;
        for path in &layout.files(scheme).paths {
            writeln!(out, "  write:      {}", path.display())?;
        }
        for other in Scheme::ALL.into_iter().filter(|s| *s != scheme) {
            for path in layout.files(other).present() {
                writeln!(out, "  remove:     {}", path.display())?;
            }
        }

        if !self.console.confirm("Apply this configuration?")? {
            writeln!(self.console.output, "Nothing was changed.")?;
            return Ok(Transition::Home);
        }

        match apply_configuration(&mut self.sys, &layout, scheme, params) {
            Ok(applied) => {
                writeln!(
                    self.console.output,
                    "Configuration written and verified ({}).",
                    applied.persisted
                )?;
                let msg = match applied.activation {
                    Activation::RebootRequired => "Reboot for the configuration to take effect.",
                    Activation::Active => "The configuration is active.",
                };
                writeln!(self.console.output, "{}", msg)?;
            }
            Err(err @ Error::Validation(_)) => {
                writeln!(self.console.output, "Error: {}", err)?;
                writeln!(
                    self.console.output,
                    "The files were left in place for inspection."
                )?;
            }
            Err(err) => {
                writeln!(self.console.output, "Error: {}", err)?;
                writeln!(self.console.output, "The configuration was not applied.")?;
            }
        }
        Ok(Transition::Home)
    }

    fn link_menu(&mut self) -> Result<Transition> {
        let items = ["Bring the interface up", "Bring the interface down"];
        let title = format!("Interface '{}':", self.config.iface);
        let input = self.console.menu(&title, &items[..], "Back")?;

        Ok(Self::navigate(input, |n| {
            let action = if n == 0 {
                Action::LinkUp
            } else {
                Action::LinkDown
            };
            Transition::Push(Screen::Action(action))
        }))
    }

    fn troubleshoot_menu(&mut self) -> Result<Transition> {
        const ACTIONS: [(Action, &str); 6] = [
            (Action::CheckTools, "Check the CAN tools"),
            (Action::InstallTools, "Install can-utils"),
            (Action::LiveCapture, "Watch bus traffic (Ctrl-C to stop)"),
            (Action::SampleCapture, "Sample and summarize bus traffic"),
            (Action::SendFrame, "Send a test frame"),
            (Action::QueryUuids, "Query Klipper node UUIDs"),
        ];

        let items = ACTIONS.iter().map(|(_, item)| *item).collect::<Vec<_>>();
        let input = self.console.menu("Troubleshooting:", &items, "Back")?;

        Ok(Self::navigate(input, |n| {
            Transition::Push(Screen::Action(ACTIONS[n].0))
        }))
    }

    // ----- Actions -----

    /// Runs a single operation, reporting to the console.
    pub fn perform(&mut self, action: Action) -> Result<()> {
        log::debug!("Performing {:?}", action);
        match action {
            Action::Validate => self.validate(),
            Action::ViewFiles => self.view_files(),
            Action::Status => self.status(),
            Action::LinkUp => self.set_link(true),
            Action::LinkDown => self.set_link(false),
            Action::CheckTools => self.check_tools(),
            Action::InstallTools => self.install_tools(),
            Action::LiveCapture => self.live_capture(),
            Action::SampleCapture => self.sample_capture(),
            Action::SendFrame => self.send_frame(),
            Action::QueryUuids => self.query_uuids(),
            Action::Remove => self.remove(),
        }
    }

    fn validate(&mut self) -> Result<()> {
        let layout = self.config.layout();
        let detection = detect(&layout);
        writeln!(self.console.output, "Detected: {}", detection)?;

        let scheme = match detection.scheme() {
            Some(scheme) => scheme,
            None => {
                if detection == Detection::Multiple {
                    writeln!(
                        self.console.output,
                        "Remove the configuration, or set it up again, to resolve the conflict."
                    )?;
                }
                return Ok(());
            }
        };

        let files = layout.files(scheme);
        for path in &files.paths {
            let state = if path.exists() { "present" } else { "MISSING" };
            writeln!(self.console.output, "  {:8} {}", state, path.display())?;
        }

        let persisted = extract_parameters(&layout, scheme);
        writeln!(self.console.output, "Configured: {}", persisted)?;
        if persisted.bitrate_value().is_none() || persisted.txqueuelen_value().is_none() {
            writeln!(
                self.console.output,
                "WARNING: the configuration is incomplete."
            )?;
        }

        if scheme.is_systemd() && !self.sys.unit_active(NETWORKD)? {
            writeln!(self.console.output, "WARNING: {} is not running.", NETWORKD)?;
        }
        if scheme == Scheme::SchemeB && !self.sys.unit_active(&layout.txqueuelen_unit())? {
            writeln!(
                self.console.output,
                "WARNING: {} is not active.",
                layout.txqueuelen_unit()
            )?;
        }

        // The link may legitimately not exist yet, e.g. before a reboot
        match self.sys.link_details(layout.iface()) {
            Ok(details) => {
                let status = LinkStatus::parse(&details);
                if status.agrees_with(&persisted) {
                    writeln!(
                        self.console.output,
                        "The live interface matches the configuration."
                    )?;
                } else {
                    writeln!(
                        self.console.output,
                        "The live interface differs: bitrate {}, txqueuelen {}.",
                        status.bitrate.map_or("unknown".into(), |b| b.to_string()),
                        status.qlen.map_or("unknown".into(), |q| q.to_string()),
                    )?;
                    if scheme == Scheme::Legacy {
                        writeln!(self.console.output, "A reboot may be pending.")?;
                    }
                }
            }
            Err(err) => {
                log::warn!("Unable to query '{}': {}", layout.iface(), err);
                writeln!(
                    self.console.output,
                    "The interface '{}' could not be queried.",
                    layout.iface()
                )?;
            }
        }
        Ok(())
    }

    fn view_files(&mut self) -> Result<()> {
        let layout = self.config.layout();
        let mut found = false;

        for scheme in Scheme::ALL {
            let files = layout.files(scheme);
            for path in files.present() {
                found = true;
                let text = std::fs::read_to_string(path)?;
                writeln!(self.console.output, "==> {} ({})", path.display(), scheme)?;
                write!(self.console.output, "{}", text)?;
                if !text.ends_with('\n') {
                    writeln!(self.console.output)?;
                }
            }
        }
        if !found {
            writeln!(self.console.output, "No configuration files found.")?;
        }
        Ok(())
    }

    fn status(&mut self) -> Result<()> {
        let details = self.sys.link_details(&self.config.iface)?;
        let status = LinkStatus::parse(&details);
        writeln!(self.console.output, "{}", status)?;
        if status.can_state.as_deref() == Some("BUS-OFF") {
            writeln!(
                self.console.output,
                "WARNING: the controller is bus-off; check wiring, termination and bitrate."
            )?;
        }
        Ok(())
    }

    fn set_link(&mut self, up: bool) -> Result<()> {
        let iface = self.config.iface.clone();
        if detect(&self.config.layout()) == Detection::Legacy {
            self.sys.ifupdown(&iface, up)?;
        } else {
            self.sys.set_link(&iface, up)?;
        }
        let state = if up { "up" } else { "down" };
        writeln!(self.console.output, "'{}' is {}.", iface, state)?;
        Ok(())
    }

    fn check_tools(&mut self) -> Result<()> {
        for tool in ["ip", "systemctl", "candump", "cansend"] {
            let state = if self.sys.tool_available(tool) {
                "found"
            } else {
                "MISSING"
            };
            writeln!(self.console.output, "  {:10} {}", tool, state)?;
        }
        let installed = self.sys.package_installed(CAN_UTILS)?;
        writeln!(
            self.console.output,
            "{} is {}installed.",
            CAN_UTILS,
            if installed { "" } else { "not " }
        )?;
        Ok(())
    }

    fn install_tools(&mut self) -> Result<()> {
        if self.sys.package_installed(CAN_UTILS)? {
            writeln!(self.console.output, "{} is already installed.", CAN_UTILS)?;
            return Ok(());
        }
        self.sys.package(PackageOp::Update, &[])?;
        self.sys.package(PackageOp::Install, &[CAN_UTILS])?;
        writeln!(self.console.output, "{} installed.", CAN_UTILS)?;
        Ok(())
    }

    fn require_tool(&mut self, tool: &str) -> Result<()> {
        if self.sys.tool_available(tool) {
            Ok(())
        } else {
            Err(Error::MissingTool(tool.to_string()))
        }
    }

    fn live_capture(&mut self) -> Result<()> {
        self.require_tool("candump")?;
        writeln!(self.console.output, "Press Ctrl-C to stop.")?;
        self.console.output.flush()?;
        self.sys.candump_live(&self.config.iface)
    }

    fn sample_capture(&mut self) -> Result<()> {
        self.require_tool("candump")?;
        writeln!(
            self.console.output,
            "Listening on '{}' for up to {} frames ({} ms)...",
            self.config.iface, SAMPLE_FRAMES, SAMPLE_TIMEOUT_MS
        )?;
        let log = self
            .sys
            .candump_sample(&self.config.iface, SAMPLE_FRAMES, SAMPLE_TIMEOUT_MS)?;
        let summary = Summary::from_log(&log)?;
        write!(self.console.output, "{}", summary)?;
        if summary.total == 0 {
            writeln!(self.console.output)?;
        }
        Ok(())
    }

    fn send_frame(&mut self) -> Result<()> {
        let answer = match self
            .console
            .prompt(&format!("Frame to send [{}]: ", TEST_FRAME))?
        {
            Some(answer) if !answer.is_empty() => answer,
            Some(_) => TEST_FRAME.to_string(),
            None => return Ok(()),
        };
        let frame: Frame = answer.parse()?;

        self.require_tool("cansend")?;
        self.sys.cansend(&self.config.iface, &frame.to_string())?;
        writeln!(self.console.output, "Sent {}", frame)?;
        Ok(())
    }

    fn query_uuids(&mut self) -> Result<()> {
        let (python, script) = (self.config.python(), self.config.uuid_script());
        let output = self.sys.query_uuids(&python, &script, &self.config.iface)?;
        let nodes = parse_uuids(&output);

        if nodes.is_empty() {
            writeln!(
                self.console.output,
                "No unassigned nodes found. Nodes already in use by Klipper are not listed."
            )?;
        }
        for node in nodes {
            writeln!(self.console.output, "  canbus_uuid: {}", node)?;
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        let layout = self.config.layout();
        if detect(&layout) == Detection::Unknown {
            writeln!(self.console.output, "No configuration files found.")?;
            return Ok(());
        }
        if !self
            .console
            .confirm(&format!("Remove every CAN configuration for '{}'?", layout.iface()))?
        {
            writeln!(self.console.output, "Nothing was changed.")?;
            return Ok(());
        }

        for path in remove_configuration(&mut self.sys, &layout)? {
            writeln!(self.console.output, "Removed {}", path.display())?;
        }
        Ok(())
    }
}

/// A menu item for a value, marking the recommended one.
fn recommended<T: std::fmt::Display>(val: &T, is_default: bool) -> String {
    if is_default {
        format!("{} (recommended)", val)
    } else {
        val.to_string()
    }
}

/////////////////////////////////////////////////////////////////////////////
