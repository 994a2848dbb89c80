//! Upload widget state: selection, prompt, result and error.

use crate::client::selection::{SelectedFile, SelectionMode, SelectionReport, SelectionSet};
use crate::client::submit::{DisplayImage, UploadClient};
use crate::error::Result;

/// State behind the upload page.
///
/// The result and the error are mutually exclusive: each submission
/// replaces whichever was shown before.
#[derive(Debug, Default)]
pub struct UploadWidget {
    /// Images pending submission.
    pub selection: SelectionSet,
    /// Current prompt text.
    pub prompt: String,
    result: Option<DisplayImage>,
    error: Option<String>,
    warning: Option<String>,
}

impl UploadWidget {
    /// Creates an empty widget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a widget around an existing selection (e.g. with custom limits).
    pub fn with_selection(selection: SelectionSet) -> Self {
        Self {
            selection,
            ..Self::default()
        }
    }

    /// Offers picked or dropped files to the selection.
    ///
    /// A rejected selection leaves the previous one in place and is shown as
    /// the error. The previous selection's warning is dropped.
    pub fn select(
        &mut self,
        files: impl IntoIterator<Item = SelectedFile>,
        mode: SelectionMode,
    ) -> Result<SelectionReport> {
        match self.selection.apply(files, mode) {
            Ok(report) => {
                self.warning = report.warning.clone();
                self.error = None;
                Ok(report)
            }
            Err(e) => {
                self.warning = None;
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Clears the selection and any selection warning.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.warning = None;
    }

    /// Submits the prompt and selection through `client`.
    ///
    /// On success the image is shown, any prior error cleared and the
    /// selection reset. On failure the message is shown verbatim and any
    /// prior result removed.
    pub async fn submit(&mut self, client: &UploadClient) -> Result<&DisplayImage> {
        match client.submit(&self.prompt, &self.selection).await {
            Ok(image) => {
                self.error = None;
                self.warning = None;
                self.selection.clear();
                let shown: &DisplayImage = self.result.insert(image);
                Ok(shown)
            }
            Err(e) => {
                self.result = None;
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// The image from the last successful submission.
    pub fn result(&self) -> Option<&DisplayImage> {
        self.result.as_ref()
    }

    /// The message from the last failure.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The warning from the last selection change.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Returns true while the client has a request in flight.
    pub fn is_busy(&self, client: &UploadClient) -> bool {
        client.is_busy()
    }
}
