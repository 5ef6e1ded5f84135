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

//! Timestamp helpers. Centralized so every crate agrees on the wire format.

use chrono::{DateTime, Utc};

/// Current instant, truncated to the precision SQLite round-trips exactly.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds since UNIX epoch, matching GitHub's `x-ratelimit-reset` header shape.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}
