use shared::domain::{CardPlacement, CardView, EnvironmentId};

use super::*;
use crate::test_support::{environment, Call, Endpoint, Reply, ScriptedGateway};

fn context(gateway: &Arc<ScriptedGateway>, session: Session) -> AppContext {
    AppContext::new(gateway.clone(), session, Arc::new(FixedAnswer(true)))
}

#[tokio::test]
async fn controllers_share_the_event_hub() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.fail(Endpoint::FetchProfile, ClientError::AuthFailure);
    let app = context(&gateway, Session::anonymous());
    let mut rx = app.events().subscribe();

    app.profile().load(UserId(1)).await.unwrap_err();

    assert_eq!(rx.try_recv().expect("event"), ClientEvent::Navigate(Route::Home));
}

#[tokio::test]
async fn settings_save_renames_the_shared_session() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.reply(
        Endpoint::FetchSettings,
        Reply::Settings(shared::protocol::Settings {
            username: "new-name".into(),
            description: "bio".into(),
        }),
    );
    let session = Session::signed_in(CurrentUser {
        id: UserId(1),
        username: "old-name".into(),
    });
    let app = context(&gateway, session.clone());

    let draft = shared::protocol::Settings {
        username: "new-name".into(),
        description: "bio".into(),
    };
    app.settings().save(&draft).await.expect("save");

    assert_eq!(session.snapshot().expect("user").username, "new-name");
}

#[test]
fn card_viewer_defaults_to_the_session_user() {
    let gateway = Arc::new(ScriptedGateway::new());
    let session = Session::signed_in(CurrentUser {
        id: UserId(1),
        username: "owner".into(),
    });
    let app = context(&gateway, session);

    let card = app.environment_card(
        environment(5, 1),
        CardContext {
            view: CardView::Normal,
            placement: CardPlacement::Profile,
            viewer: None,
            editing_enabled: true,
            can_change_logo: true,
        },
    );

    let affordances = card.affordances();
    assert!(affordances.edit && affordances.delete && affordances.change_logo);
    assert_eq!(card.id(), EnvironmentId(5));
}

#[tokio::test]
async fn each_controller_gets_its_own_lifetime() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.reply(Endpoint::FetchSettings, Reply::Settings(shared::protocol::Settings {
        username: "a".into(),
        description: "b".into(),
    }));
    let app = context(&gateway, Session::anonymous());

    app.profile().dispose();
    app.settings().load().await.expect("settings still load");
    assert_eq!(gateway.calls(), vec![Call::FetchSettings]);
}
