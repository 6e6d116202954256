use crate::conversation::ConversationView;
use crate::hooks::{use_api, use_conversations, use_identity, use_messages};
use crate::message::{self, Message, NewMessage};
use leptos::ev::SubmitEvent;
use leptos::*;

#[component]
pub fn Inbox() -> impl IntoView {
    let conversations = use_conversations();
    let (selected, set_selected) = create_signal(None::<ConversationView>);
    view! {
        <aside class="inbox">
            <h2>"Messages"</h2>
            <Suspense fallback=move || view! { <p>"Loading conversations..."</p> }>
                {move || {
                    conversations
                        .get()
                        .map(|result| match result {
                            Ok(list) if list.is_empty() => {
                                view! { <p>"No conversations yet."</p> }.into_view()
                            }
                            Ok(list) => {
                                view! {
                                    <ul>
                                        {list
                                            .into_iter()
                                            .map(|conversation| {
                                                let pick = conversation.clone();
                                                view! {
                                                    <li on:click=move |_| set_selected.set(Some(pick.clone()))>
                                                        <strong>{conversation.other_user_name}</strong>
                                                        <span>{conversation.last_message}</span>
                                                    </li>
                                                }
                                            })
                                            .collect_view()}
                                    </ul>
                                }
                                    .into_view()
                            }
                            Err(err) => view! { <p class="error">{err}</p> }.into_view(),
                        })
                }}
            </Suspense>
        </aside>
        {move || {
            selected.get().map(|conversation| view! { <Thread conversation=conversation /> })
        }}
    }
}

#[component]
fn Thread(conversation: ConversationView) -> impl IntoView {
    let api = use_api();
    let identity = use_identity();
    let conversation_id = conversation.id.clone();
    let messages = use_messages(move || Some(conversation_id.clone()));
    let (draft, set_draft) = create_signal(String::new());
    let (failure, set_failure) = create_signal(None::<String>);

    let thread_id = conversation.id.clone();
    let receiver = conversation.other_user_id.clone();
    let send = move |ev: SubmitEvent| {
        ev.prevent_default();
        let Some(me) = identity.get_untracked() else {
            return;
        };
        let outgoing = NewMessage {
            conversation_id: thread_id.clone(),
            sender_id: me.id,
            receiver_id: (!receiver.is_empty()).then(|| receiver.clone()),
            text: draft.get_untracked(),
        };
        let api = api.clone();
        spawn_local(async move {
            match message::send_message(&api, &outgoing).await {
                Ok(_) => {
                    set_draft.set(String::new());
                    set_failure.set(None);
                    messages.refetch();
                }
                Err(err) => set_failure.set(Some(err.to_string())),
            }
        });
    };

    view! {
        <section class="thread">
            <h3>{conversation.other_user_name}</h3>
            <Suspense fallback=move || view! { <p>"Loading messages..."</p> }>
                {move || {
                    messages
                        .get()
                        .map(|result| match result {
                            Ok(list) => {
                                list.into_iter()
                                    .map(|message| view! { <Message message=message /> })
                                    .collect_view()
                            }
                            Err(err) => view! { <p class="error">{err}</p> }.into_view(),
                        })
                }}
            </Suspense>
            <form on:submit=send>
                <input
                    placeholder="Your message..."
                    on:input=move |ev| set_draft.set(event_target_value(&ev))
                    prop:value=draft
                />
                <button type="submit">"Send"</button>
            </form>
            {move || failure.get().map(|failure| view! { <p class="error">{failure}</p> })}
        </section>
    }
}
