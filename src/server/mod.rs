// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The server side: one [`acceptor::Acceptor`] per listening socket, one
//! [`connection::ServerConnection`] per accepted client.

pub mod acceptor;
pub mod connection;

pub use acceptor::Acceptor;
pub use connection::ServerConnection;
