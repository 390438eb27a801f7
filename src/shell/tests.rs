use super::*;
use crate::channel::{decode_body, encode_frame, MenuNode, StatusItemPayload};
use proptest::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

const A: ProcessId = ProcessId(100);
const B: ProcessId = ProcessId(200);

fn server() -> ShellServer {
    ShellServer::new(&ShellConfig::default())
}

fn connect(server: &mut ShellServer, pid: ProcessId) -> UnboundedReceiver<Message> {
    let (endpoint, rx) = SessionEndpoint::channel();
    server.open_session(pid, endpoint).unwrap();
    rx
}

fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn editor_menu() -> MenuNode {
    MenuNode::new("Editor").with_children([
        MenuNode::new("File").with_children([
            MenuNode::new("Open").with_key("Ctrl+O"),
            MenuNode::new("Quit").with_key("Ctrl+Q"),
        ]),
        MenuNode::new("Edit"),
    ])
}

fn status(handle: u64, title: &str) -> Message {
    Message::RegisterStatusItem {
        handle: StatusHandle(handle),
        payload: StatusItemPayload::titled(title),
    }
}

#[test]
fn test_session_starts_connecting_and_activates_on_first_message() {
    let mut server = server();
    let mut rx = connect(&mut server, A);

    assert_eq!(server.session_state(A), Some(SessionState::Connecting));
    assert_eq!(server.active(), None);

    server
        .handle_message(A, Message::RegisterMenu(editor_menu()))
        .unwrap();

    assert_eq!(server.session_state(A), Some(SessionState::Active));
    assert_eq!(server.active(), Some(A));
    assert_eq!(drain(&mut rx), vec![Message::Activate(true)]);
}

#[test]
fn test_second_app_does_not_steal_active() {
    let mut server = server();
    let _rx_a = connect(&mut server, A);
    let mut rx_b = connect(&mut server, B);

    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();
    server.handle_message(B, Message::RegisterMenu(MenuNode::new("Mail"))).unwrap();

    assert_eq!(server.active(), Some(A));
    assert!(drain(&mut rx_b).is_empty());
}

#[test]
fn test_duplicate_and_limit_rejected() {
    let mut config = ShellConfig::default();
    config.max_sessions = 1;
    let mut server = ShellServer::new(&config);
    let _rx = connect(&mut server, A);

    let (endpoint, _) = SessionEndpoint::channel();
    assert_eq!(
        server.open_session(A, endpoint.clone()),
        Err(ShellError::DuplicateSession(A))
    );
    assert_eq!(
        server.open_session(B, endpoint),
        Err(ShellError::TooManySessions { limit: 1 })
    );
    assert_eq!(server.session_count(), 1);
}

#[test]
fn test_latest_menu_replaces_previous() {
    let mut server = server();
    let _rx = connect(&mut server, A);

    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();
    let second = MenuNode::new("Editor").with_child(MenuNode::new("View"));
    server.handle_message(A, Message::RegisterMenu(second.clone())).unwrap();

    assert_eq!(server.menu_of(A), Some(&second));
    let frame = server.render();
    let titles: Vec<_> = frame
        .app_menu
        .unwrap()
        .titles
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["View"]);
}

#[test]
fn test_malformed_menu_leaves_previous_tree() {
    let mut server = server();
    let _rx = connect(&mut server, A);
    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();

    let mut frame = encode_frame(&Message::RegisterMenu(MenuNode::new("Broken")), 1024).unwrap();
    frame.truncate(frame.len() - 3);
    let body = &frame[4..];

    // The decoder refuses the body, so nothing reaches the server
    assert!(decode_body(body).is_err());
    assert_eq!(server.menu_of(A), Some(&editor_menu()));
}

#[test]
fn test_client_activate_is_rejected_without_side_effects() {
    let mut server = server();
    let _rx = connect(&mut server, A);

    assert_eq!(
        server.handle_message(A, Message::Activate(true)),
        Err(ShellError::UnexpectedMessage(A, MessageKind::Activate))
    );
    assert_eq!(server.session_state(A), Some(SessionState::Connecting));
    assert_eq!(server.active(), None);
}

#[test]
fn test_unknown_session_and_unknown_item() {
    let mut server = server();
    assert_eq!(
        server.handle_message(A, status(1, "x")),
        Err(ShellError::UnknownSession(A))
    );

    let _rx = connect(&mut server, A);
    assert_eq!(
        server.handle_message(A, Message::UnregisterStatusItem(StatusHandle(9))),
        Err(ShellError::UnknownStatusItem {
            owner: A,
            handle: StatusHandle(9)
        })
    );
}

#[test]
fn test_rejected_first_message_does_not_activate() {
    let mut server = server();
    let mut rx = connect(&mut server, A);

    assert!(server
        .handle_message(A, Message::UnregisterStatusItem(StatusHandle(9)))
        .is_err());
    assert_eq!(server.session_state(A), Some(SessionState::Connecting));
    assert_eq!(server.active(), None);
    assert!(drain(&mut rx).is_empty());

    server.handle_message(A, status(1, "a")).unwrap();
    assert_eq!(server.active(), Some(A));
    assert_eq!(drain(&mut rx), vec![Message::Activate(true)]);
}

#[test]
fn test_status_item_limit_per_app() {
    let mut config = ShellConfig::default();
    config.max_status_items_per_app = 2;
    let mut server = ShellServer::new(&config);
    let _rx = connect(&mut server, A);

    server.handle_message(A, status(1, "a")).unwrap();
    server.handle_message(A, status(2, "b")).unwrap();
    assert_eq!(
        server.handle_message(A, status(3, "c")),
        Err(ShellError::TooManyStatusItems { owner: A, limit: 2 })
    );
    assert_eq!(server.status_items_of(A).len(), 2);
}

#[test]
fn test_set_active_notifies_both_sides() {
    let mut server = server();
    let mut rx_a = connect(&mut server, A);
    let mut rx_b = connect(&mut server, B);
    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();
    server.handle_message(B, Message::RegisterMenu(MenuNode::new("Mail"))).unwrap();
    drain(&mut rx_a);

    server.set_active(B).unwrap();
    assert_eq!(drain(&mut rx_a), vec![Message::Activate(false)]);
    assert_eq!(drain(&mut rx_b), vec![Message::Activate(true)]);

    // Re-activating the active session is silent
    server.set_active(B).unwrap();
    assert!(drain(&mut rx_b).is_empty());

    assert_eq!(
        server.set_active(ProcessId(999)),
        Err(ShellError::UnknownSession(ProcessId(999)))
    );
}

#[test]
fn test_tray_click_activates_owner() {
    let mut server = server();
    let _rx_a = connect(&mut server, A);
    let mut rx_b = connect(&mut server, B);
    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();
    server.handle_message(B, status(4, "Mail")).unwrap();

    server.status_item_clicked(B, StatusHandle(4)).unwrap();
    assert_eq!(server.active(), Some(B));
    assert_eq!(drain(&mut rx_b), vec![Message::Activate(true)]);

    assert!(server.status_item_clicked(A, StatusHandle(4)).is_err());
}

#[test]
fn test_reap_leaves_no_trace() {
    let mut server = server();
    let _rx_a = connect(&mut server, A);
    let _rx_b = connect(&mut server, B);
    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();
    server.handle_message(A, status(1, "clock")).unwrap();
    server.handle_message(A, status(2, "battery")).unwrap();
    server.handle_message(B, status(1, "mail")).unwrap();

    assert!(server.reap(A));
    assert!(!server.reap(A));

    let frame = server.render();
    assert!(!frame.mentions(A));
    assert_eq!(server.active(), None);
    assert!(frame.app_menu.is_none());
    assert_eq!(frame.tray_keys(), vec![(B, StatusHandle(1))]);

    // Stray messages after the reap are dropped
    assert_eq!(
        server.handle_message(A, status(3, "late")),
        Err(ShellError::UnknownSession(A))
    );
    assert!(!server.render().mentions(A));
}

#[test]
fn test_render_is_pure() {
    let mut server = server();
    let _rx = connect(&mut server, A);
    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();
    server.handle_message(A, status(1, "x")).unwrap();
    server.set_clock("09:41");

    assert_eq!(server.render(), server.render());
}

#[test]
fn test_dirty_flag_and_clock() {
    let mut server = server();
    assert!(!server.take_dirty());

    assert!(server.set_clock("10:00"));
    assert!(!server.set_clock("10:00"));
    assert!(server.take_dirty());
    assert!(!server.take_dirty());

    let _rx = connect(&mut server, A);
    server.handle_message(A, status(1, "x")).unwrap();
    assert!(server.take_dirty());
    assert_eq!(server.render().clock, "10:00");
}

#[test]
fn test_two_app_scenario() {
    let mut server = server();
    server.set_clock("12:00");
    let mut rx_a = connect(&mut server, A);
    let mut rx_b = connect(&mut server, B);

    server.handle_message(A, Message::RegisterMenu(editor_menu())).unwrap();
    server.handle_message(A, status(1, "A1")).unwrap();
    server.handle_message(B, Message::RegisterMenu(MenuNode::new("Mail").with_child(MenuNode::new("Inbox")))).unwrap();
    server.handle_message(B, status(1, "B1")).unwrap();
    server.handle_message(A, status(2, "A2")).unwrap();

    let frame = server.render();
    assert_eq!(frame.app_menu.as_ref().map(|m| m.owner), Some(A));
    assert_eq!(
        frame.tray_keys(),
        vec![(A, StatusHandle(1)), (A, StatusHandle(2)), (B, StatusHandle(1))]
    );

    server.status_item_clicked(B, StatusHandle(1)).unwrap();
    let frame = server.render();
    let menu = frame.app_menu.unwrap();
    assert_eq!(menu.owner, B);
    assert_eq!(menu.app_name, "Mail");
    assert_eq!(drain(&mut rx_a), vec![Message::Activate(true), Message::Activate(false)]);
    assert_eq!(drain(&mut rx_b), vec![Message::Activate(true)]);

    assert!(server.reap(B));
    let frame = server.render();
    assert!(frame.app_menu.is_none());
    assert_eq!(frame.tray_keys(), vec![(A, StatusHandle(1)), (A, StatusHandle(2))]);
    assert_eq!(frame.clock, "12:00");
}

#[derive(Debug, Clone)]
enum Op {
    Register(usize, u64),
    Unregister(usize, u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, 0u64..6).prop_map(|(app, h)| Op::Register(app, h)),
        (0usize..3, 0u64..6).prop_map(|(app, h)| Op::Unregister(app, h)),
    ]
}

proptest! {
    #[test]
    fn prop_tray_order_is_connection_then_registration(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let pids = [ProcessId(1), ProcessId(2), ProcessId(3)];
        let mut server = server();
        let _rxs: Vec<_> = pids.iter().map(|pid| connect(&mut server, *pid)).collect();

        // Model: per app, handles in first-registration order
        let mut model: Vec<Vec<u64>> = vec![Vec::new(); pids.len()];
        for op in &ops {
            match *op {
                Op::Register(app, h) => {
                    server.handle_message(pids[app], status(h, "s")).unwrap();
                    if !model[app].contains(&h) {
                        model[app].push(h);
                    }
                }
                Op::Unregister(app, h) => {
                    let result = server.handle_message(pids[app], Message::UnregisterStatusItem(StatusHandle(h)));
                    prop_assert_eq!(result.is_ok(), model[app].contains(&h));
                    model[app].retain(|x| *x != h);
                }
            }
        }

        let expected: Vec<_> = model
            .iter()
            .enumerate()
            .flat_map(|(app, handles)| handles.iter().map(move |h| (pids[app], StatusHandle(*h))))
            .collect();
        prop_assert_eq!(server.render().tray_keys(), expected);
    }

    #[test]
    fn prop_reap_removes_everything_of_one_app(
        ops in prop::collection::vec(op_strategy(), 0..40),
        victim in 0usize..3,
    ) {
        let pids = [ProcessId(1), ProcessId(2), ProcessId(3)];
        let mut server = server();
        let _rxs: Vec<_> = pids.iter().map(|pid| connect(&mut server, *pid)).collect();
        for (i, pid) in pids.iter().enumerate() {
            server.handle_message(*pid, Message::RegisterMenu(MenuNode::new(format!("app{}", i)))).unwrap();
        }
        for op in &ops {
            if let Op::Register(app, h) = *op {
                server.handle_message(pids[app], status(h, "s")).unwrap();
            }
        }

        let survivors_before: Vec<_> = server
            .render()
            .tray_keys()
            .into_iter()
            .filter(|(owner, _)| *owner != pids[victim])
            .collect();

        server.set_active(pids[victim]).unwrap();
        prop_assert!(server.reap(pids[victim]));

        let frame = server.render();
        prop_assert!(!frame.mentions(pids[victim]));
        prop_assert_eq!(frame.tray_keys(), survivors_before);
        prop_assert!(server.menu_of(pids[victim]).is_none());
        prop_assert_eq!(server.active(), None);
    }
}
