//! Windows-specific pieces: registry access, elevation and the native
//! confirmation dialog.

pub(crate) mod dialog;
mod privileges;
pub(crate) mod registry;

pub(crate) use privileges::is_elevated;
pub(crate) use registry::os_version;
