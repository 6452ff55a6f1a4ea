// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Frame read/write helpers shared by the server connection and the client.

use anyhow::{Context as _, Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{
    codec::SerializeType,
    header::{RequestHeader, ResponseHeader, REQ_HEADER_LEN, RESP_HEADER_LEN},
};

/// Reads the fixed-size [`RequestHeader`] off `socket`.
///
/// Returns `Ok(None)` on a clean EOF at the very first byte (the peer closed
/// the connection between calls); a partial header is an error, not EOF.
pub async fn read_head<S>(socket: &mut S) -> Result<Option<RequestHeader>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQ_HEADER_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = socket
            .read(&mut buf[filled..])
            .await
            .context("reading request header")?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("connection closed mid-header ({filled}/{} bytes)", buf.len());
        }
        filled += n;
    }
    let head = RequestHeader::from_bytes(&buf)?;
    if !head.has_valid_magic() {
        bail!("bad magic byte: 0x{:02x}", head.magic);
    }
    Ok(Some(head))
}

/// Reads exactly `head.length()` bytes of request body off `socket`.
pub async fn read_payload<S>(socket: &mut S, head: &RequestHeader) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; head.length() as usize];
    socket
        .read_exact(&mut buf)
        .await
        .context("reading request payload")?;
    Ok(buf)
}

/// Reads the fixed-size [`ResponseHeader`] off `socket`, used by the client.
pub async fn read_response_head<S>(socket: &mut S) -> Result<ResponseHeader>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; RESP_HEADER_LEN];
    socket
        .read_exact(&mut buf)
        .await
        .context("reading response header")?;
    let head = ResponseHeader::from_bytes(&buf)?;
    if !head.has_valid_magic() {
        bail!("bad magic byte: 0x{:02x}", head.magic);
    }
    Ok(head)
}

/// Reads exactly `head.length()` bytes of response body off `socket`.
pub async fn read_response_payload<S>(socket: &mut S, head: &ResponseHeader) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; head.length() as usize];
    socket
        .read_exact(&mut buf)
        .await
        .context("reading response payload")?;
    Ok(buf)
}

/// Builds the header+body bytes for a response, echoing the request's
/// `seq_num` as the RPC layer requires for matching replies to calls.
pub fn prepare_response(seq_num: u32, body: &[u8], err_code: u8) -> Vec<u8> {
    let head = ResponseHeader::new(seq_num, body.len() as u32, err_code);
    let mut out = Vec::with_capacity(RESP_HEADER_LEN + body.len());
    out.extend_from_slice(&head.to_bytes());
    out.extend_from_slice(body);
    out
}

/// Builds the header+body bytes for an outgoing request.
pub fn prepare_request(seq_num: u32, function_id: u32, body: &[u8], serialize_type: SerializeType) -> Vec<u8> {
    let mut head = RequestHeader::new(seq_num, function_id, body.len() as u32);
    head.serialize_type = serialize_type as u8;
    let mut out = Vec::with_capacity(REQ_HEADER_LEN + body.len());
    out.extend_from_slice(&head.to_bytes());
    out.extend_from_slice(body);
    out
}

/// Picks the [`SerializeType`] a request's body was encoded with.
///
/// Unlike the original this is derived from, which treats any non-zero tag
/// as unsupported, this crate recognizes both codecs it ships (see
/// [`crate::protocol::codec::Codec`]); an unrecognized tag still falls back
/// to `None` so the caller can turn it into a `protocol_error`.
pub fn get_serialize_protocol(head: &RequestHeader) -> Option<SerializeType> {
    SerializeType::from_u8(head.serialize_type).ok()
}

/// Extracts the key used to look up a handler in the router.
pub fn get_route_key(head: &RequestHeader) -> u32 {
    head.function_id()
}

/// Flushes `buf` to `socket`.
pub async fn write_all<S>(socket: &mut S, buf: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    socket.write_all(buf).await.context("writing frame")?;
    socket.flush().await.context("flushing frame")
}
