//! Endpoint role discovery
//!
//! Given the endpoint descriptors of a claimed interface, pick the pair the
//! pipeline talks to. This is a static property of the descriptor: failure
//! is final and never retried.

use crate::error::{CaptureError, Result};
use crate::types::{EndpointDirection, EndpointInfo, EndpointPair, TransferKind};
use tracing::warn;

/// Select the first IN and first OUT endpoint, in descriptor order.
///
/// Transfer type is not part of the selection. The goggles expose bulk
/// endpoints on the video interface, but an interface listing another kind
/// first would be picked all the same; that case is logged so it shows up in
/// bring-up instead of failing silently downstream.
pub fn resolve(endpoints: &[EndpointInfo]) -> Result<EndpointPair> {
    let input = find(endpoints, EndpointDirection::In)?;
    let output = find(endpoints, EndpointDirection::Out)?;

    for endpoint in [&input, &output] {
        if endpoint.kind != TransferKind::Bulk {
            warn!(
                "selected endpoint {:#04x} is {}, not bulk",
                endpoint.address, endpoint.kind
            );
        }
    }

    Ok(EndpointPair { input, output })
}

fn find(endpoints: &[EndpointInfo], direction: EndpointDirection) -> Result<EndpointInfo> {
    endpoints
        .iter()
        .find(|endpoint| endpoint.direction == direction)
        .copied()
        .ok_or(CaptureError::MissingEndpoint { direction })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(address: u8, direction: EndpointDirection) -> EndpointInfo {
        EndpointInfo {
            address,
            direction,
            kind: TransferKind::Bulk,
            max_packet_size: 512,
        }
    }

    #[test]
    fn test_resolves_in_and_out() {
        let endpoints = [
            bulk(0x81, EndpointDirection::In),
            bulk(0x01, EndpointDirection::Out),
        ];
        let pair = resolve(&endpoints).unwrap();
        assert_eq!(pair.input.address, 0x81);
        assert_eq!(pair.output.address, 0x01);
    }

    #[test]
    fn test_first_match_wins() {
        let endpoints = [
            bulk(0x81, EndpointDirection::In),
            bulk(0x82, EndpointDirection::In),
            bulk(0x01, EndpointDirection::Out),
            bulk(0x02, EndpointDirection::Out),
        ];
        let pair = resolve(&endpoints).unwrap();
        assert_eq!(pair.input.address, 0x81);
        assert_eq!(pair.output.address, 0x01);
    }

    #[test]
    fn test_missing_out_endpoint() {
        let endpoints = [bulk(0x81, EndpointDirection::In)];
        match resolve(&endpoints) {
            Err(CaptureError::MissingEndpoint { direction }) => {
                assert_eq!(direction, EndpointDirection::Out);
            }
            other => panic!("expected MissingEndpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_in_endpoint() {
        let endpoints = [bulk(0x01, EndpointDirection::Out)];
        match resolve(&endpoints) {
            Err(CaptureError::MissingEndpoint { direction }) => {
                assert_eq!(direction, EndpointDirection::In);
            }
            other => panic!("expected MissingEndpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_interface() {
        assert!(resolve(&[]).is_err());
    }

    #[test]
    fn test_non_bulk_endpoint_is_still_selected() {
        let endpoints = [
            EndpointInfo {
                address: 0x83,
                direction: EndpointDirection::In,
                kind: TransferKind::Interrupt,
                max_packet_size: 64,
            },
            bulk(0x01, EndpointDirection::Out),
        ];
        let pair = resolve(&endpoints).unwrap();
        assert_eq!(pair.input.address, 0x83);
        assert_eq!(pair.input.kind, TransferKind::Interrupt);
    }
}
