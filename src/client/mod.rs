//! Client side of the upload page: selection, submission and widget state.

pub mod selection;
mod submit;
mod widget;

pub use selection::{
    FileKey, Preview, SelectedFile, SelectionLimits, SelectionMode, SelectionReport, SelectionSet,
    MAX_FILES, MAX_TOTAL_BYTES,
};
pub use submit::{DisplayImage, UploadClient, UploadClientBuilder, DEFAULT_ENDPOINT};
pub use widget::UploadWidget;
