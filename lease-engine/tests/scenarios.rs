//! End-to-end scenarios against an in-memory store: bootstrap, discover,
//! request, contention, release, TTL expiry + reclaim, and DNS aliasing.

use std::net::Ipv4Addr;
use std::sync::Arc;

use config::{HwAddr, NamesFile};
use dhcproto::v4::{DhcpOption, Message, MessageType, OptionCode};
use kv_gateway::{AddrRange, FakeKv, KeySchema, KvStore};
use lease_engine::{bootstrap, DnsPublisher, Handler, LeaseEngine};

const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

fn hw(n: u8) -> HwAddr {
    format!("aa:bb:cc:00:00:{n:02x}").parse().unwrap()
}

fn request(chaddr: &[u8; 6], msg_type: MessageType) -> Message {
    let uns = Ipv4Addr::UNSPECIFIED;
    let mut msg = Message::new(uns, uns, uns, uns, chaddr);
    msg.opts_mut().insert(DhcpOption::MessageType(msg_type));
    msg
}

fn blank_reply() -> Message {
    Message::new(
        Ipv4Addr::UNSPECIFIED,
        Ipv4Addr::UNSPECIFIED,
        SERVER_IP,
        Ipv4Addr::UNSPECIFIED,
        &[0; 6],
    )
}

fn chaddr(hw: &HwAddr) -> [u8; 6] {
    *hw.as_bytes()
}

async fn setup() -> (
    Arc<FakeKv>,
    KeySchema,
    AddrRange,
    Arc<Handler<FakeKv>>,
) {
    let store = Arc::new(FakeKv::new());
    let keys = KeySchema::new("dhcp", "::");
    // end is exclusive, so this spans the three addresses .10-.12 inclusive
    let range = AddrRange::new(Ipv4Addr::new(10, 0, 0, 10), Ipv4Addr::new(10, 0, 0, 13));
    bootstrap::bootstrap(store.as_ref(), &keys, &range).await.unwrap();

    let engine = Arc::new(LeaseEngine::new(store.clone(), keys.clone(), None));
    let handler = Arc::new(Handler::new(engine, SERVER_IP));
    (store, keys, range, handler)
}

#[tokio::test]
async fn s1_bootstrap_stamps_the_whole_range_free() {
    let (store, keys, _range, _handler) = setup().await;
    for ip in ["10.0.0.10", "10.0.0.11", "10.0.0.12"] {
        let addr: Ipv4Addr = ip.parse().unwrap();
        assert_eq!(store.get(&keys.ip_free(addr)).await.unwrap(), Some(ip.to_owned()));
    }
}

#[tokio::test]
async fn s2_discover_new_offers_first_free_and_leaves_store_untouched() {
    let (store, keys, _range, handler) = setup().await;
    let mac1 = chaddr(&hw(1));

    let before = store.get_by_prefix(&keys.ip_free_prefix()).await.unwrap();
    let discover = request(&mac1, MessageType::Discover);
    let (reply, stop) = handler.handle(&discover, blank_reply()).await.unwrap();
    let reply = reply.expect("offer expected");
    assert!(!stop);
    assert_eq!(reply.yiaddr(), Ipv4Addr::new(10, 0, 0, 10));
    let after = store.get_by_prefix(&keys.ip_free_prefix()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn s3_request_new_acks_and_claims_the_address() {
    let (store, keys, _range, handler) = setup().await;
    let mac1 = chaddr(&hw(1));

    let mut req = request(&mac1, MessageType::Request);
    req.opts_mut()
        .insert(DhcpOption::RequestedIpAddress(Ipv4Addr::new(10, 0, 0, 10)));
    req.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));

    let (reply, stop) = handler.handle(&req, blank_reply()).await.unwrap();
    let reply = reply.expect("ack expected");
    assert!(!stop);
    assert!(matches!(
        reply.opts().get(OptionCode::MessageType),
        Some(DhcpOption::MessageType(MessageType::Ack))
    ));
    assert_eq!(reply.yiaddr(), Ipv4Addr::new(10, 0, 0, 10));
    assert!(matches!(
        reply.opts().get(OptionCode::AddressLeaseTime),
        Some(DhcpOption::AddressLeaseTime(600))
    ));

    let ip = Ipv4Addr::new(10, 0, 0, 10);
    assert_eq!(store.get(&keys.ip_free(ip)).await.unwrap(), None);
    assert_eq!(store.get(&keys.ip_leased(ip)).await.unwrap(), Some(hw(1).to_string()));
    assert_eq!(store.get(&keys.nic_leased(&hw(1))).await.unwrap(), Some(ip.to_string()));
}

#[tokio::test]
async fn s4_discover_of_already_leased_mac_offers_its_bound_address_unchanged() {
    let (store, keys, _range, handler) = setup().await;
    let mac1 = chaddr(&hw(1));

    let mut req = request(&mac1, MessageType::Request);
    req.opts_mut()
        .insert(DhcpOption::RequestedIpAddress(Ipv4Addr::new(10, 0, 0, 10)));
    req.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));
    handler.handle(&req, blank_reply()).await.unwrap();

    let before = store.get_by_prefix(&keys.ip_leased_prefix()).await.unwrap();
    let discover = request(&mac1, MessageType::Discover);
    let (reply, _stop) = handler.handle(&discover, blank_reply()).await.unwrap();
    assert_eq!(reply.unwrap().yiaddr(), Ipv4Addr::new(10, 0, 0, 10));
    let after = store.get_by_prefix(&keys.ip_leased_prefix()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn s5_contention_exactly_one_ack_one_nak() {
    let (_store, _keys, _range, handler) = setup().await;
    let ip = Ipv4Addr::new(10, 0, 0, 10);

    let mut req1 = request(&chaddr(&hw(1)), MessageType::Request);
    req1.opts_mut().insert(DhcpOption::RequestedIpAddress(ip));
    req1.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));

    let mut req2 = request(&chaddr(&hw(2)), MessageType::Request);
    req2.opts_mut().insert(DhcpOption::RequestedIpAddress(ip));
    req2.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));

    let (reply1, _) = handler.handle(&req1, blank_reply()).await.unwrap();
    let (reply2, _) = handler.handle(&req2, blank_reply()).await.unwrap();

    let msg_type = |reply: &Option<Message>| -> Option<MessageType> {
        match reply.as_ref()?.opts().get(OptionCode::MessageType)? {
            DhcpOption::MessageType(t) => Some(*t),
            _ => None,
        }
    };
    let types = [msg_type(&reply1), msg_type(&reply2)];
    let acks = types.iter().filter(|t| **t == Some(MessageType::Ack)).count();
    let naks = types.iter().filter(|t| **t == Some(MessageType::Nak)).count();
    assert_eq!(acks, 1);
    assert_eq!(naks, 1);
}

#[tokio::test]
async fn s6_release_frees_the_address() {
    let (store, keys, _range, handler) = setup().await;
    let mac1 = chaddr(&hw(1));
    let ip = Ipv4Addr::new(10, 0, 0, 10);

    let mut req = request(&mac1, MessageType::Request);
    req.opts_mut().insert(DhcpOption::RequestedIpAddress(ip));
    req.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));
    handler.handle(&req, blank_reply()).await.unwrap();

    let mut release = request(&mac1, MessageType::Release);
    release.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));
    let (reply, stop) = handler.handle(&release, blank_reply()).await.unwrap();
    assert!(reply.is_none());
    assert!(stop);

    assert_eq!(store.get(&keys.ip_leased(ip)).await.unwrap(), None);
    assert_eq!(store.get(&keys.ip_free(ip)).await.unwrap(), Some(ip.to_string()));
    assert_eq!(store.get(&keys.nic_leased(&hw(1))).await.unwrap(), None);
}

#[tokio::test]
async fn s7_ttl_expiry_then_one_sweep_reclaims_the_address() {
    let (store, keys, range, handler) = setup().await;
    let mac3 = chaddr(&hw(3));
    let ip = Ipv4Addr::new(10, 0, 0, 11);

    let mut req = request(&mac3, MessageType::Request);
    req.opts_mut().insert(DhcpOption::RequestedIpAddress(ip));
    req.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));
    handler.handle(&req, blank_reply()).await.unwrap();

    // the one REQUEST above is the only call that ever grants a store
    // lease in this test, so it is lease id 1.
    store.expire_lease(1).await;

    assert_eq!(store.get(&keys.ip_leased(ip)).await.unwrap(), None);
    assert_eq!(store.get(&keys.ip_free(ip)).await.unwrap(), None);

    let stats = lease_engine::reclaim::sweep(store.as_ref(), &keys, &range).await.unwrap();
    assert_eq!(stats.reclaimed, 1);
    assert_eq!(store.get(&keys.ip_free(ip)).await.unwrap(), Some(ip.to_string()));
}

#[tokio::test]
async fn s8_dns_alias_publishes_a_and_cname_on_ack() {
    let store = Arc::new(FakeKv::new());
    let keys = KeySchema::new("dhcp", "::");
    // end is exclusive, so this spans the three addresses .10-.12 inclusive
    let range = AddrRange::new(Ipv4Addr::new(10, 0, 0, 10), Ipv4Addr::new(10, 0, 0, 13));
    bootstrap::bootstrap(store.as_ref(), &keys, &range).await.unwrap();

    let names = NamesFile::parse_str("alias www host1", "names.txt").unwrap();
    let dns = DnsPublisher::new(store.clone(), keys.clone(), "zone".to_owned(), names);
    let engine = Arc::new(LeaseEngine::new(store.clone(), keys.clone(), Some(dns)));
    let handler = Arc::new(Handler::new(engine, SERVER_IP));

    let mac4 = chaddr(&hw(4));
    let ip = Ipv4Addr::new(10, 0, 0, 12);
    let mut req = request(&mac4, MessageType::Request);
    req.opts_mut().insert(DhcpOption::RequestedIpAddress(ip));
    req.opts_mut().insert(DhcpOption::ServerIdentifier(SERVER_IP));
    req.opts_mut().insert(DhcpOption::Hostname("host1".to_owned()));

    let (reply, _stop) = handler.handle(&req, blank_reply()).await.unwrap();
    assert!(matches!(
        reply.unwrap().opts().get(OptionCode::MessageType),
        Some(DhcpOption::MessageType(MessageType::Ack))
    ));

    assert_eq!(store.get("dhcp::zone::A::www").await.unwrap(), Some(ip.to_string()));
    assert_eq!(store.get("dhcp::zone::CNAME::host1").await.unwrap(), Some("www".to_owned()));
}
