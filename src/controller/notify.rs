use std::sync::Mutex;

/// User-facing notification surface
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);

    /// Ask the user to open a URL, e.g. to grant the apply script access
    fn open_url(&self, url: &str);
}

/// Prints notifications for the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn alert(&self, message: &str) {
        println!("{message}");
    }

    fn open_url(&self, url: &str) {
        println!();
        println!("🔐 Authorization needed. Open this URL, grant access, then apply again:");
        println!("   {url}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Alert(String),
    OpenUrl(String),
}

/// Keeps every notification in order
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Alert(message) => Some(message),
                Notice::OpenUrl(_) => None,
            })
            .collect()
    }

    fn push(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.push(Notice::Alert(message.to_string()));
    }

    fn open_url(&self, url: &str) {
        self.push(Notice::OpenUrl(url.to_string()));
    }
}

/// Text shown after the host finished an apply
pub fn success_message(pr_url: Option<&str>) -> String {
    let mut message = "Success 🎉".to_string();
    if let Some(url) = pr_url {
        message.push_str("\n\nPull Request:\n");
        message.push_str(url);
    }
    message
}
