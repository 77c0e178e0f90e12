//! Integration tests for RUDT channel configuration
//!
//! Exercise the config against real UDP sockets and the in-memory fake,
//! through the public API only.

use rudt_integration_tests::{FakeSocket, SocketCall, loopback};
use rudt_transport::config::{
    DEFAULT_ALLOCATOR_BUFFER_SIZE, DEFAULT_PROTOCOL_BUFFER_SIZE, DEFAULT_SYSTEM_BUFFER_SIZE,
    PROTOCOL_RECEIVE_BUFFER_SIZE, SYSTEM_SEND_BUFFER_SIZE,
};
use rudt_transport::{
    ApplyError, ApplyStep, ChannelError, ChannelKind, ChannelOption, ChannelSettings,
    DefaultChannelConfig, NativeOption, OptionError, OptionStore, OptionValue, SettingsError,
    SocketHandle, TransportChannelConfig, TransportOption, UdpSocketHandle, UdtChannel,
    ValueKind, KIB, MIB,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_default_apply_sequence() {
    let socket = FakeSocket::new();
    TransportChannelConfig::new(&socket, true).unwrap();

    assert_eq!(
        socket.calls(),
        vec![
            SocketCall::ReuseAddress(true),
            SocketCall::SendBufferSize(DEFAULT_ALLOCATOR_BUFFER_SIZE),
            SocketCall::Linger(false, 0),
            SocketCall::Native(
                NativeOption::ProtocolReceiveBufferSize,
                DEFAULT_PROTOCOL_BUFFER_SIZE
            ),
            SocketCall::Native(
                NativeOption::ProtocolSendBufferSize,
                DEFAULT_PROTOCOL_BUFFER_SIZE
            ),
            SocketCall::Native(
                NativeOption::SystemReceiveBufferSize,
                DEFAULT_SYSTEM_BUFFER_SIZE
            ),
            SocketCall::Native(NativeOption::SystemSendBufferSize, DEFAULT_SYSTEM_BUFFER_SIZE),
        ]
    );
}

#[test]
fn test_allocator_receive_size_is_never_pushed() {
    let socket = FakeSocket::new();
    let config = TransportChannelConfig::detached();
    config.set_receive_buffer_size(256 * KIB);
    config.apply(&socket).unwrap();

    assert!(
        !socket
            .calls()
            .iter()
            .any(|call| matches!(call, SocketCall::ReceiveBufferSize(_)))
    );
    assert_eq!(socket.receive_buffer_size().unwrap(), 0);
}

#[test]
fn test_configured_values_reach_the_socket() {
    let socket = FakeSocket::new();
    let config = TransportChannelConfig::detached();
    config.set_reuse_address(false);
    config.set_send_buffer_size(4 * KIB);
    config.set_so_linger(7);
    config.set_protocol_receive_buffer_size(20 * MIB);
    config.set_protocol_send_buffer_size(5 * MIB);
    config.set_system_receive_buffer_size(2 * MIB);
    config.set_system_send_buffer_size(3 * MIB);
    config.apply(&socket).unwrap();

    assert!(!socket.reuse_address().unwrap());
    assert_eq!(socket.send_buffer_size().unwrap(), 4 * KIB);
    assert_eq!(socket.so_linger().unwrap(), Some(Duration::from_secs(7)));
    assert_eq!(
        socket.option(NativeOption::ProtocolReceiveBufferSize).unwrap(),
        20 * MIB
    );
    assert_eq!(
        socket.option(NativeOption::ProtocolSendBufferSize).unwrap(),
        5 * MIB
    );
    assert_eq!(
        socket.option(NativeOption::SystemReceiveBufferSize).unwrap(),
        2 * MIB
    );
    assert_eq!(
        socket.option(NativeOption::SystemSendBufferSize).unwrap(),
        3 * MIB
    );
}

#[test]
fn test_negative_linger_disables() {
    let socket = FakeSocket::new();
    let config = TransportChannelConfig::detached();
    config.set_so_linger(-1);
    config.apply(&socket).unwrap();

    assert_eq!(socket.calls()[2], SocketCall::Linger(false, 0));
    assert_eq!(socket.so_linger().unwrap(), None);
}

#[test]
fn test_failure_propagates_step_and_error() {
    let socket = FakeSocket::failing_at(4);
    let err = TransportChannelConfig::new(&socket, true).unwrap_err();

    assert_eq!(err.step(), Some(ApplyStep::ProtocolSendBufferSize));
    let source = err.io_error().unwrap();
    assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
    assert_eq!(source.to_string(), "fake failure on call 4");

    // The failing call was attempted; nothing after it was.
    assert_eq!(socket.calls().len(), 5);
    assert_eq!(
        socket.option(NativeOption::SystemReceiveBufferSize).unwrap(),
        0
    );
}

#[test]
fn test_second_apply_is_rejected() {
    let first = FakeSocket::new();
    let second = FakeSocket::new();
    let config = TransportChannelConfig::new(&first, true).unwrap();

    assert!(matches!(
        config.apply(&second),
        Err(ApplyError::AlreadyApplied)
    ));
    assert!(second.calls().is_empty());
}

#[test]
fn test_post_apply_mutation_is_in_memory_only() {
    let socket = FakeSocket::new();
    let config = TransportChannelConfig::new(&socket, true).unwrap();
    let before = socket.calls();

    config
        .set_option(&PROTOCOL_RECEIVE_BUFFER_SIZE, OptionValue::Size(MIB))
        .unwrap();
    config.set_reuse_address(false);

    assert_eq!(config.protocol_receive_buffer_size(), MIB);
    assert!(!config.is_reuse_address());
    assert_eq!(socket.calls(), before);
    assert!(socket.reuse_address().unwrap());
}

#[test]
fn test_generic_and_typed_access_agree() {
    let config = TransportChannelConfig::detached();

    assert!(
        config
            .set_option(&SYSTEM_SEND_BUFFER_SIZE, OptionValue::Size(3 * MIB))
            .unwrap()
    );
    assert_eq!(config.system_send_buffer_size(), 3 * MIB);
    // Tiers stay independent.
    assert_eq!(config.system_receive_buffer_size(), DEFAULT_SYSTEM_BUFFER_SIZE);
    assert_eq!(config.send_buffer_size(), DEFAULT_ALLOCATOR_BUFFER_SIZE);
    assert_eq!(config.protocol_send_buffer_size(), DEFAULT_PROTOCOL_BUFFER_SIZE);

    config.set_backlog(512);
    assert_eq!(
        config.option(&ChannelOption::SO_BACKLOG),
        Some(OptionValue::Size(512))
    );
}

#[test]
fn test_wrong_payload_kind_rejected() {
    let config = TransportChannelConfig::detached();
    let err = config
        .set_option(&ChannelOption::SO_LINGER, OptionValue::Bool(true))
        .unwrap_err();

    assert_eq!(
        err,
        OptionError::TypeMismatch {
            option: "SO_LINGER",
            expected: ValueKind::Int,
            actual: ValueKind::Bool,
        }
    );
    assert_eq!(config.so_linger(), 0);
}

#[test]
fn test_host_keys_delegate_to_base() {
    let config = TransportChannelConfig::detached();

    assert!(
        config
            .set_option(&ChannelOption::WRITE_SPIN_COUNT, OptionValue::Int(4))
            .unwrap()
    );
    assert_eq!(config.base().write_spin_count(), 4);
    assert_eq!(
        config.option(&ChannelOption::CONNECT_TIMEOUT_MILLIS),
        Some(OptionValue::Int(30_000))
    );

    let err = config
        .set_option(&ChannelOption::WRITE_SPIN_COUNT, OptionValue::Int(0))
        .unwrap_err();
    assert!(matches!(err, OptionError::InvalidValue { option: "WRITE_SPIN_COUNT", .. }));
}

#[test]
fn test_unknown_key_falls_through() {
    let config = TransportChannelConfig::detached();
    let unknown = ChannelOption::new("IP_TOS", ValueKind::Int);

    assert_eq!(config.option(&unknown), None);
    assert!(!config.set_option(&unknown, OptionValue::Int(0x10)).unwrap());
}

#[test]
fn test_shared_base_sees_host_writes() {
    let base = Arc::new(DefaultChannelConfig::new());
    let config = TransportChannelConfig::detached_with_base(Arc::clone(&base));

    config
        .set_option(&ChannelOption::AUTO_READ, OptionValue::Bool(false))
        .unwrap();
    assert!(!base.is_auto_read());
    // Recognized keys never reach the base.
    config
        .set_option(&ChannelOption::SO_REUSEADDR, OptionValue::Bool(false))
        .unwrap();
    assert_eq!(base.option(&ChannelOption::SO_REUSEADDR), None);
}

#[test]
fn test_options_snapshot_covers_every_key() {
    let config = TransportChannelConfig::detached();
    let options = config.options();

    for option in TransportOption::ALL {
        assert!(options.contains_key(&option.key()), "missing {}", option.key());
    }
    assert!(options.contains_key(&ChannelOption::WRITE_BUFFER_HIGH_WATER_MARK));
    assert_eq!(options.len(), TransportOption::ALL.len() + 5);
}

#[test]
fn test_apply_to_real_udp_socket() {
    let socket = UdpSocketHandle::for_addr(&loopback()).unwrap();
    let config = TransportChannelConfig::detached();
    config.set_protocol_receive_buffer_size(2 * MIB);
    config.set_protocol_send_buffer_size(MIB);
    config.set_so_linger(2);
    config.apply(&socket).unwrap();

    assert!(socket.reuse_address().unwrap());
    assert_eq!(socket.so_linger().unwrap(), Some(Duration::from_secs(2)));
    assert_eq!(
        socket.option(NativeOption::ProtocolReceiveBufferSize).unwrap(),
        2 * MIB
    );
    assert_eq!(
        socket.option(NativeOption::ProtocolSendBufferSize).unwrap(),
        MIB
    );
    assert!(socket.send_buffer_size().unwrap() > 0);
}

#[test]
fn test_real_socket_rejects_oversized_system_buffer() {
    let socket = UdpSocketHandle::for_addr(&loopback()).unwrap();
    let config = TransportChannelConfig::detached();
    config.set_system_receive_buffer_size(i32::MAX as usize + 1);

    let err = config.apply(&socket).unwrap_err();
    assert_eq!(err.step(), Some(ApplyStep::SystemReceiveBufferSize));
    assert_eq!(err.io_error().unwrap().kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn test_channel_lifecycle_on_loopback() {
    let socket = UdpSocketHandle::for_addr(&loopback()).unwrap();
    let channel = UdtChannel::new(ChannelKind::MessageAcceptor, socket).unwrap();
    assert!(channel.kind().is_acceptor());
    assert!(channel.config().is_applied());

    channel.socket().bind(loopback()).unwrap();
    let addr = channel.socket().local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let udp = channel.into_socket().into_udp_socket();
    assert_eq!(udp.local_addr().unwrap(), addr);
}

#[test]
fn test_channel_with_failing_socket() {
    let err = UdtChannel::new(ChannelKind::ByteRendezvous, FakeSocket::failing_at(0)).unwrap_err();
    match err {
        ChannelError::Apply(ApplyError::Io { step, .. }) => {
            assert_eq!(step, ApplyStep::ReuseAddress);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_settings_file_drives_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("channel.toml");
    std::fs::write(
        &path,
        "[transport]\n\
         protocol_send_buffer_size = 4194304\n\
         so_linger = 9\n\
         \n\
         [channel]\n\
         write_buffer_high_water_mark = 16384\n\
         write_buffer_low_water_mark = 8192\n",
    )
    .unwrap();

    let settings = ChannelSettings::load(&path).unwrap();
    let socket = FakeSocket::new();
    let channel = UdtChannel::with_settings(ChannelKind::ByteConnector, &socket, &settings).unwrap();

    assert_eq!(
        socket.option(NativeOption::ProtocolSendBufferSize).unwrap(),
        4 * MIB
    );
    assert_eq!(socket.so_linger().unwrap(), Some(Duration::from_secs(9)));
    assert_eq!(channel.config().base().write_buffer_high_water_mark(), 16 * KIB);
    assert_eq!(channel.config().base().write_buffer_low_water_mark(), 8 * KIB);
}

#[test]
fn test_settings_rejected_by_validation() {
    let settings =
        ChannelSettings::from_toml_str("[channel]\nconnect_timeout_millis = -5\n").unwrap();
    let config = TransportChannelConfig::detached();

    let err = settings.apply_to(&config).unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Option(OptionError::InvalidValue {
            option: "CONNECT_TIMEOUT_MILLIS",
            ..
        })
    ));
}
