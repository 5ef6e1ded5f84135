// Copyright 2025 Nexus Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The Replay subsystem: git worktree materialization (C7), the adapter-
//! based process orchestrator (C8), and the three-tier env var overlay (C9).

pub mod adapter;
pub mod env_resolver;
pub mod error;
pub mod safe_archive;
pub mod worktree;

pub mod orchestrator;

pub use adapter::{Adapter, StaticHtmlAdapter};
pub use env_resolver::EnvResolver;
pub use error::{ReplayError, ReplayResult};
pub use orchestrator::{InstanceStatus, PortAllocator, ReplayInstance, ReplayOrchestrator};
pub use worktree::{CommitSummary, FileTreeEntry, WorktreeManager};
