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

/// A unit of work that delivers every pending instance of one event type.
///
/// Drain procedures are created by the category registries and invoked by the
/// host once per tick, either individually (for latency-sensitive chains) or
/// through a coordinator that runs all of them in a fixed order. Running a
/// drain twice in the same tick is safe: the second pass finds nothing left.
pub trait DrainProcedure {
    /// Delivers pending instances to subscribers and clears non-persistent ones.
    fn run(&self);

    /// A human-readable label, usually the event type name.
    fn label(&self) -> &'static str;
}
