// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod check;
pub mod export;
pub mod import;
pub mod init;
pub mod query;

pub use check::check_command;
pub use export::{ExportArgs, export_command};
pub use import::{ImportArgs, import_command};
pub use init::init_command;
pub use query::{QueryArgs, query_command};
