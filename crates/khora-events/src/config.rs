// Copyright 2025 eraflo
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

//! Construction-time settings for the event bus.

use crate::error::EventBusResult;
use serde::{Deserialize, Serialize};

/// Capacity hints used when an [`EventBus`](crate::EventBus) is created.
///
/// Values only pre-size internal tables; every table still grows on demand.
///
/// ```rust
/// use khora_events::EventBusConfig;
///
/// let config = EventBusConfig::from_ron("(event_capacity: 32)").unwrap();
/// assert_eq!(config.event_capacity, 32);
/// assert_eq!(config.unique_capacity, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Expected number of distinct event types per category; also pre-sizes the events world.
    pub event_capacity: usize,
    /// Expected number of distinct unique event types.
    pub unique_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            event_capacity: 8,
            unique_capacity: 8,
        }
    }
}

impl EventBusConfig {
    /// Parses a configuration from RON text. Missing fields take their defaults.
    pub fn from_ron(text: &str) -> EventBusResult<Self> {
        Ok(ron::from_str(text)?)
    }
}
