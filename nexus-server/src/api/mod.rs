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

//! HTTP handler modules, one per functional area of the external interface
//! (spec.md §6). Kept deliberately thin: the real logic lives in the
//! component crates; these functions extract, call, and shape a response.

pub mod common;
pub mod discovery;
pub mod envvars;
pub mod releases;
pub mod replay;
pub mod servers;
pub mod settings;
pub mod status;
pub mod watchlist;
