use super::*;
use crate::{
    events::ClientEvent,
    session::CurrentUser,
    test_support::{drain, server_error, Call, Endpoint, Reply, ScriptedGateway},
};

fn profile(id: i64, description: Option<&str>) -> Profile {
    Profile {
        id: UserId(id),
        username: format!("user-{id}"),
        description: description.map(str::to_string),
    }
}

fn controller(gateway: &Arc<ScriptedGateway>, session: Session) -> (ProfileController, EventHub) {
    let events = EventHub::new();
    let controller =
        ProfileController::new(gateway.clone(), session, events.clone(), Lifetime::new());
    (controller, events)
}

#[tokio::test]
async fn own_profile_is_recognised() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.reply(Endpoint::FetchProfile, Reply::Profile(profile(4, Some("hi"))));
    let session = Session::signed_in(CurrentUser {
        id: UserId(4),
        username: "user-4".into(),
    });
    let (controller, _) = controller(&gateway, session);

    let view = controller.load(UserId(4)).await.expect("load");

    assert!(view.is_own);
    assert_eq!(view.description(), "hi");
}

#[tokio::test]
async fn someone_elses_profile_is_not_own() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.reply(Endpoint::FetchProfile, Reply::Profile(profile(8, None)));
    let (controller, _) = controller(&gateway, Session::anonymous());

    let view = controller.load(UserId(8)).await.expect("load");

    assert!(!view.is_own);
    assert_eq!(view.description(), NO_PROFILE_DESCRIPTION);
}

#[tokio::test]
async fn failed_load_navigates_home() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.fail(Endpoint::FetchProfile, server_error());
    let (controller, events) = controller(&gateway, Session::anonymous());
    let mut rx = events.subscribe();

    controller.load(UserId(99)).await.unwrap_err();

    assert_eq!(drain(&mut rx), vec![ClientEvent::Navigate(Route::Home)]);
}

#[tokio::test]
async fn images_load_together_and_fall_back_to_default() {
    let gateway = Arc::new(ScriptedGateway::new());
    let avatar = ImageResource::new("image/png", vec![1u8, 2]);
    gateway
        .reply(Endpoint::FetchAvatar, Reply::Image(Some(avatar.clone())))
        .fail(Endpoint::FetchBanner, server_error());
    let (controller, _) = controller(&gateway, Session::anonymous());

    let images = controller.load_images(UserId(3)).await.expect("images");

    assert_eq!(images.avatar, Some(avatar));
    assert_eq!(images.banner, None);
    let calls = gateway.calls();
    assert!(calls.contains(&Call::FetchAvatar(UserId(3))));
    assert!(calls.contains(&Call::FetchBanner(UserId(3))));
}
