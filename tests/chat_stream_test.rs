// ABOUTME: End-to-end tests for the chat orchestrator over in-memory stores
// ABOUTME: Covers linear chat, branching, merging, cancellation, errors, and auto-title
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use braid_server::errors::{AppResult, ErrorCode};
use braid_server::llm::{
    ChatEvent, ChatEventStream, ChatRequest, MessageRole, ModelProvider, ProviderCapabilities,
    ProviderRegistry,
};
use braid_server::models::MessageNode;
use braid_server::services::{ChatLimits, ChatService, ChatStreamEvent, ChatStreamRequest};
use braid_server::store::{
    ConversationStore, MemoryConversationStore, MemoryMessageStore, MessageStore,
};
use futures_util::{pin_mut, StreamExt};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted Provider
// ============================================================================

/// A provider that replays a fixed event script and records what it was asked
struct ScriptedProvider {
    script: Vec<ChatEvent>,
    /// After emitting this many events, hang until cancellation
    hang_after: Option<usize>,
    title_reply: String,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedProvider {
    fn new(script: Vec<ChatEvent>) -> Self {
        Self {
            script,
            hang_after: None,
            title_reply: "Scripted Title".to_owned(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn hanging_after(mut self, events: usize) -> Self {
        self.hang_after = Some(events);
        self
    }

    fn request_log(&self) -> Arc<Mutex<Vec<ChatRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn display_name(&self) -> &str {
        "Mock"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::STREAMING | ProviderCapabilities::REASONING
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> AppResult<ChatEventStream> {
        self.requests.lock().unwrap().push(request.clone());

        let script = self.script.clone();
        let hang_after = self.hang_after;
        let events = async_stream::stream! {
            for (i, event) in script.into_iter().enumerate() {
                if hang_after == Some(i) {
                    cancel.cancelled().await;
                    return;
                }
                yield event;
            }
        };
        Ok(Box::pin(events))
    }

    async fn complete(&self, _request: &ChatRequest) -> AppResult<String> {
        Ok(self.title_reply.clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    service: ChatService,
    conversations: Arc<MemoryConversationStore>,
    messages: Arc<MemoryMessageStore>,
}

fn harness_with(provider: ScriptedProvider, limits: ChatLimits) -> Harness {
    let conversations = Arc::new(MemoryConversationStore::new());
    let messages = Arc::new(MemoryMessageStore::new());

    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(provider));

    let service = ChatService::new(
        Arc::clone(&conversations) as Arc<dyn ConversationStore>,
        Arc::clone(&messages) as Arc<dyn MessageStore>,
        Arc::new(registry),
        limits,
        "mock",
    );

    Harness {
        service,
        conversations,
        messages,
    }
}

fn harness(provider: ScriptedProvider) -> Harness {
    harness_with(provider, ChatLimits::default())
}

fn answer_script(text: &str) -> Vec<ChatEvent> {
    vec![ChatEvent::Content(text.to_owned()), ChatEvent::Done]
}

fn request(conversation_id: &str, message: &str, parents: &[&str]) -> ChatStreamRequest {
    ChatStreamRequest {
        conversation_id: conversation_id.to_owned(),
        user_id: "u1".to_owned(),
        model: "mock".to_owned(),
        message: message.to_owned(),
        parent_ids: parents.iter().map(|p| (*p).to_owned()).collect(),
        deep_thinking: false,
        search_enabled: false,
    }
}

async fn collect(
    service: &ChatService,
    req: ChatStreamRequest,
) -> AppResult<Vec<ChatStreamEvent>> {
    let stream = service
        .stream_chat(req, CancellationToken::new())
        .await?;
    pin_mut!(stream);

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    Ok(events)
}

fn user_message_id(events: &[ChatStreamEvent]) -> String {
    events
        .iter()
        .find_map(|e| match e {
            ChatStreamEvent::UserMessage { user_message_id } => Some(user_message_id.clone()),
            _ => None,
        })
        .expect("user_message_id frame present")
}

fn completed_message_id(events: &[ChatStreamEvent]) -> Option<String> {
    events.iter().find_map(|e| match e {
        ChatStreamEvent::Complete { message_id, .. } => Some(message_id.clone()),
        _ => None,
    })
}

/// Edge symmetry: b in a.children iff a in b.parent_ids
fn assert_edge_symmetry(nodes: &[MessageNode]) {
    let by_id: std::collections::HashMap<&str, &MessageNode> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    for node in nodes {
        for child in &node.children {
            let child_node = by_id[child.as_str()];
            assert!(
                child_node.parent_ids.contains(&node.id),
                "{} lists child {child} without the reverse parent edge",
                node.id
            );
        }
        for parent in &node.parent_ids {
            let parent_node = by_id[parent.as_str()];
            assert!(
                parent_node.children.contains(&node.id),
                "{} lists parent {parent} without the forward child edge",
                node.id
            );
        }
    }
}

/// Exactly one root per conversation, and it is a user node
fn assert_single_user_root(nodes: &[MessageNode]) {
    let roots: Vec<&MessageNode> = nodes.iter().filter(|n| n.parent_ids.is_empty()).collect();
    assert_eq!(roots.len(), 1, "exactly one root expected");
    assert_eq!(roots[0].role, MessageRole::User);
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn linear_chat_three_turns() {
    let h = harness(ScriptedProvider::new(answer_script("hello")));
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    // Turn 1
    let events = collect(&h.service, request(&conversation.id, "hi", &[]))
        .await
        .unwrap();
    let u1 = user_message_id(&events);
    let a1 = completed_message_id(&events).expect("turn 1 completes");

    // The first frame is the user node ID, the last the terminal frame
    assert!(matches!(events[0], ChatStreamEvent::UserMessage { .. }));
    assert!(matches!(
        events.last(),
        Some(ChatStreamEvent::Complete { complete: true, .. })
    ));

    // Turn 2 and 3 continue from the previous answer
    let events = collect(&h.service, request(&conversation.id, "q", &[&a1]))
        .await
        .unwrap();
    let u2 = user_message_id(&events);
    let a2 = completed_message_id(&events).expect("turn 2 completes");

    let events = collect(&h.service, request(&conversation.id, "more", &[&a2]))
        .await
        .unwrap();
    let u3 = user_message_id(&events);
    let a3 = completed_message_id(&events).expect("turn 3 completes");

    // The history is one chain U1 -> A1 -> U2 -> A2 -> U3 -> A3
    let nodes = h
        .messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert_eq!(nodes.len(), 6);
    assert_edge_symmetry(&nodes);
    assert_single_user_root(&nodes);

    let by_id: std::collections::HashMap<&str, &MessageNode> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    assert_eq!(by_id[u1.as_str()].children, vec![a1.clone()]);
    assert_eq!(by_id[a1.as_str()].children, vec![u2.clone()]);
    assert_eq!(by_id[a2.as_str()].children, vec![u3.clone()]);
    assert_eq!(by_id[a3.as_str()].parent_ids, vec![u3.clone()]);

    // The accumulated answer was persisted verbatim
    assert_eq!(by_id[a1.as_str()].content, "hello");
    assert_eq!(by_id[a1.as_str()].model.as_deref(), Some("mock"));
}

#[tokio::test]
async fn reasoning_frames_precede_content_and_are_persisted() {
    let h = harness(ScriptedProvider::new(vec![
        ChatEvent::Reasoning("think ".to_owned()),
        ChatEvent::Reasoning("hard".to_owned()),
        ChatEvent::Content("answer".to_owned()),
        ChatEvent::Done,
    ]));
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    let events = collect(&h.service, request(&conversation.id, "why?", &[]))
        .await
        .unwrap();

    // Frame order: user id, reasoning*, content*, complete
    let kinds: Vec<u8> = events
        .iter()
        .map(|e| match e {
            ChatStreamEvent::UserMessage { .. } => 0,
            ChatStreamEvent::Reasoning { .. } => 1,
            ChatStreamEvent::Content { .. } => 2,
            ChatStreamEvent::Complete { .. } => 3,
            ChatStreamEvent::Error { .. } => 4,
        })
        .collect();
    assert_eq!(kinds, vec![0, 1, 1, 2, 3]);

    let assistant_id = completed_message_id(&events).unwrap();
    let node = h.messages.get(&assistant_id).await.unwrap().unwrap();
    assert_eq!(node.reasoning.as_deref(), Some("think hard"));
    assert_eq!(node.content, "answer");
}

#[tokio::test]
async fn branching_two_follow_ups_under_one_answer() {
    let h = harness(ScriptedProvider::new(answer_script("a")));
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    let events = collect(&h.service, request(&conversation.id, "start", &[]))
        .await
        .unwrap();
    let a1 = completed_message_id(&events).unwrap();

    // Two alternative follow-ups branch off the same answer
    let left = collect(&h.service, request(&conversation.id, "left", &[&a1]))
        .await
        .unwrap();
    let right = collect(&h.service, request(&conversation.id, "right", &[&a1]))
        .await
        .unwrap();

    let u_left = user_message_id(&left);
    let u_right = user_message_id(&right);
    let a_left = completed_message_id(&left).unwrap();
    let a_right = completed_message_id(&right).unwrap();

    let branch_point = h.messages.get(&a1).await.unwrap().unwrap();
    assert_eq!(branch_point.children.len(), 2);
    assert!(branch_point.children.contains(&u_left));
    assert!(branch_point.children.contains(&u_right));

    // Q/A atomicity: each assistant has exactly one parent, a user node
    for (assistant, user) in [(&a_left, &u_left), (&a_right, &u_right)] {
        let node = h.messages.get(assistant).await.unwrap().unwrap();
        assert_eq!(node.parent_ids, vec![user.clone()]);
        let parent = h.messages.get(user).await.unwrap().unwrap();
        assert_eq!(parent.role, MessageRole::User);
        assert!(parent.children.contains(assistant));
    }

    let nodes = h
        .messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert_edge_symmetry(&nodes);
    assert_single_user_root(&nodes);
}

#[tokio::test]
async fn merging_two_answers_into_one_question() {
    let provider = ScriptedProvider::new(answer_script("a"));
    let request_log = provider.request_log();
    let h = harness(provider);
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    // Build the branched shape first
    let events = collect(&h.service, request(&conversation.id, "start", &[]))
        .await
        .unwrap();
    let a1 = completed_message_id(&events).unwrap();
    let left = collect(&h.service, request(&conversation.id, "left", &[&a1]))
        .await
        .unwrap();
    let right = collect(&h.service, request(&conversation.id, "right", &[&a1]))
        .await
        .unwrap();
    let a_left = completed_message_id(&left).unwrap();
    let a_right = completed_message_id(&right).unwrap();

    // Merge both answers as joint context
    let merge = collect(
        &h.service,
        request(&conversation.id, "combine", &[&a_left, &a_right]),
    )
    .await
    .unwrap();
    let u_merge = user_message_id(&merge);

    let merge_node = h.messages.get(&u_merge).await.unwrap().unwrap();
    assert_eq!(merge_node.parent_ids.len(), 2);
    assert!(merge_node.parent_ids.contains(&a_left));
    assert!(merge_node.parent_ids.contains(&a_right));

    // Both parents gained the reverse edge
    for parent in [&a_left, &a_right] {
        let node = h.messages.get(parent).await.unwrap().unwrap();
        assert!(node.children.contains(&u_merge));
    }

    // The history handed to the model covers the whole sub-DAG (6 ancestor
    // messages) plus the merge question, root pair first, pairs contiguous.
    let last_request = request_log.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last_request.messages.len(), 7);
    assert_eq!(last_request.messages[0].content, "start");
    assert_eq!(last_request.messages[0].role, MessageRole::User);
    assert_eq!(last_request.messages[1].content, "a");
    assert_eq!(last_request.messages[6].content, "combine");

    let contents: Vec<&str> = last_request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    // Q/A pairs stay adjacent; the earlier-created branch comes first
    let left_pos = contents.iter().position(|c| *c == "left").unwrap();
    assert_eq!(contents[left_pos + 1], "a");
    let right_pos = contents.iter().position(|c| *c == "right").unwrap();
    assert_eq!(contents[right_pos + 1], "a");
    assert!(left_pos < right_pos);

    let nodes = h
        .messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert_edge_symmetry(&nodes);
    assert_single_user_root(&nodes);
}

#[tokio::test]
async fn client_disconnect_discards_partial_answer_but_keeps_question() {
    let provider = ScriptedProvider::new(vec![
        ChatEvent::Content("partial ".to_owned()),
        ChatEvent::Content("never sent".to_owned()),
        ChatEvent::Done,
    ])
    .hanging_after(1);
    let h = harness(provider);
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    let cancel = CancellationToken::new();
    let stream = h
        .service
        .stream_chat(request(&conversation.id, "question", &[]), cancel.clone())
        .await
        .unwrap();
    pin_mut!(stream);

    // Consume frames until the first content token, then drop the connection;
    // the stream must end silently (no error, no terminal frame).
    let mut saw_content = false;
    let mut saw_user_id = false;
    while let Some(event) = stream.next().await {
        match event {
            ChatStreamEvent::UserMessage { .. } => saw_user_id = true,
            ChatStreamEvent::Content { .. } => {
                saw_content = true;
                cancel.cancel();
            }
            other => panic!("unexpected frame after cancel: {other:?}"),
        }
    }
    assert!(saw_user_id && saw_content);

    // Discard-partial policy: the question survives, the answer does not
    let nodes = h
        .messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].role, MessageRole::User);
    assert_eq!(nodes[0].content, "question");
    assert!(nodes[0].children.is_empty());
}

#[tokio::test]
async fn adapter_error_ends_stream_without_assistant_node() {
    let h = harness(ScriptedProvider::new(vec![
        ChatEvent::Content("par".to_owned()),
        ChatEvent::Error("vendor down".to_owned()),
    ]));
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    let events = collect(&h.service, request(&conversation.id, "q", &[]))
        .await
        .unwrap();

    assert!(matches!(
        events.last(),
        Some(ChatStreamEvent::Error { .. })
    ));
    assert!(completed_message_id(&events).is_none());

    let nodes = h
        .messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert_eq!(nodes.len(), 1, "only the user node is persisted");
    assert_eq!(nodes[0].role, MessageRole::User);
}

#[tokio::test(start_paused = true)]
async fn idle_silence_times_out_with_an_error_frame() {
    // Hang immediately: the adapter stream never produces an event
    let provider =
        ScriptedProvider::new(vec![ChatEvent::Content("x".to_owned())]).hanging_after(0);

    let limits = ChatLimits {
        total_timeout: Duration::from_secs(120),
        idle_timeout: Duration::from_millis(200),
    };
    let h = harness_with(provider, limits);
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    let events = collect(&h.service, request(&conversation.id, "q", &[]))
        .await
        .unwrap();

    assert!(matches!(
        events.last(),
        Some(ChatStreamEvent::Error { error }) if error.contains("timed out")
    ));
    let nodes = h
        .messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert_eq!(nodes.len(), 1, "no assistant node after a timeout");
}

#[tokio::test]
async fn first_turn_schedules_auto_title() {
    let h = harness(ScriptedProvider::new(answer_script("four cities")));
    let conversation = h.conversations.create("u1", "mock").await.unwrap();
    assert!(conversation.title.is_empty());

    let events = collect(
        &h.service,
        request(&conversation.id, "Top 4 cities in France?", &[]),
    )
    .await
    .unwrap();
    assert!(completed_message_id(&events).is_some());

    // The job is detached; poll briefly for its effect
    let mut title = String::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        title = h
            .conversations
            .get(&conversation.id)
            .await
            .unwrap()
            .unwrap()
            .title;
        if !title.is_empty() {
            break;
        }
    }
    assert_eq!(title, "Scripted Title");
    assert!(title.chars().count() <= 64);

    // Conversation model list was touched with the answering model
    let refreshed = h.conversations.get(&conversation.id).await.unwrap().unwrap();
    assert!(refreshed.models.contains(&"mock".to_owned()));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn validation_rejects_before_any_side_effect() {
    let h = harness(ScriptedProvider::new(answer_script("a")));
    let conversation = h.conversations.create("u1", "mock").await.unwrap();

    // Unknown model
    let mut bad = request(&conversation.id, "q", &[]);
    bad.model = "gpt-unknown".to_owned();
    let err = h
        .service
        .stream_chat(bad, CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::UnknownModel);

    // Unknown conversation
    let err = h
        .service
        .stream_chat(request("missing", "q", &[]), CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    // Foreign user cannot write into the conversation
    let mut foreign = request(&conversation.id, "q", &[]);
    foreign.user_id = "intruder".to_owned();
    let err = h
        .service
        .stream_chat(foreign, CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    // Unknown parent
    let err = h
        .service
        .stream_chat(
            request(&conversation.id, "q", &["m-404404"]),
            CancellationToken::new(),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    // Empty message
    let err = h
        .service
        .stream_chat(request(&conversation.id, "   ", &[]), CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    // None of the rejected requests persisted anything
    let nodes = h
        .messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert!(nodes.is_empty());
}

#[tokio::test]
async fn parent_from_another_conversation_is_rejected() {
    let h = harness(ScriptedProvider::new(answer_script("a")));
    let mine = h.conversations.create("u1", "mock").await.unwrap();
    let other = h.conversations.create("u1", "mock").await.unwrap();

    let events = collect(&h.service, request(&other.id, "seed", &[]))
        .await
        .unwrap();
    let foreign_parent = completed_message_id(&events).unwrap();

    let err = h
        .service
        .stream_chat(
            request(&mine.id, "q", &[&foreign_parent]),
            CancellationToken::new(),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}
