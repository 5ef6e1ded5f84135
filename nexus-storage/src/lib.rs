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

//! SQLite-backed persistence (C1): the coalescing cache, rate-limit
//! snapshot, watchlist, release cache, Replay repositories/commits, env
//! vars, app config, and the log sink.

pub mod applog;
pub mod cache;
pub mod config_store;
pub mod envvars;
pub mod error;
pub mod pool;
pub mod ratelimit;
pub mod releases;
pub mod replay_repo;
pub mod watchlist;

pub use error::{StorageError, StorageResult};
pub use pool::open;
