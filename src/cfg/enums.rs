// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Strategy a [`crate::client::channel::Channel`] uses to pick which pool
/// serves the next call.
#[derive(Deserialize, Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalance {
    #[serde(rename = "RoundRobin", alias = "round_robin", alias = "round-robin")]
    #[default]
    RoundRobin,
    #[serde(rename = "Random", alias = "random")]
    Random,
}

impl fmt::Display for LoadBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadBalance::RoundRobin => "RoundRobin",
            LoadBalance::Random => "Random",
        })
    }
}
