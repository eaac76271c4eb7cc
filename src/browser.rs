//! Launching the authorization page.

// std
use std::{io, process::Command};
// self
use crate::_prelude::*;

/// Opens an authorization URL for the user.
pub trait UrlOpener
where
	Self: Send + Sync,
{
	/// Opens `url`. Failure is reported but never aborts the flow; the URL is also logged.
	fn open(&self, url: &Url) -> io::Result<()>;
}

/// Hands the URL to the platform's default handler (`open`, `xdg-open`, or `cmd /C start`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemOpener;
impl UrlOpener for SystemOpener {
	fn open(&self, url: &Url) -> io::Result<()> {
		let status = command(url.as_str()).status()?;

		if status.success() {
			Ok(())
		} else {
			Err(io::Error::other(format!("URL handler exited with {status}")))
		}
	}
}

#[cfg(target_os = "macos")]
fn command(url: &str) -> Command {
	let mut cmd = Command::new("open");

	cmd.arg(url);

	cmd
}

#[cfg(target_os = "windows")]
fn command(url: &str) -> Command {
	let mut cmd = Command::new("cmd");

	cmd.args(["/C", "start", "", url]);

	cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn command(url: &str) -> Command {
	let mut cmd = Command::new("xdg-open");

	cmd.arg(url);

	cmd
}

/// Prints the URL to stderr instead of launching anything, for headless hosts.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrintOpener;
impl UrlOpener for PrintOpener {
	fn open(&self, url: &Url) -> io::Result<()> {
		eprintln!("Open this URL to authorize:\n{url}");

		Ok(())
	}
}

/// Records every URL it is asked to open and notifies an optional hook.
#[derive(Default)]
pub struct RecordingOpener {
	opened: Mutex<Vec<Url>>,
	hook: Option<Box<dyn Fn(&Url) + Send + Sync>>,
}
impl RecordingOpener {
	/// Creates an opener that calls `hook` after recording each URL.
	pub fn with_hook(hook: impl Fn(&Url) + 'static + Send + Sync) -> Self {
		Self { opened: Mutex::default(), hook: Some(Box::new(hook)) }
	}

	/// URLs opened so far.
	pub fn opened(&self) -> Vec<Url> {
		self.opened.lock().clone()
	}
}
impl Debug for RecordingOpener {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RecordingOpener").field("opened", &self.opened.lock().len()).finish()
	}
}
impl UrlOpener for RecordingOpener {
	fn open(&self, url: &Url) -> io::Result<()> {
		self.opened.lock().push(url.clone());

		if let Some(hook) = &self.hook {
			hook(url);
		}

		Ok(())
	}
}
