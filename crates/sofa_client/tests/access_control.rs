//! Authentication and `_security` enforcement.

mod common;

use sofa_client::ClientError;
use sofa_testkit::{secured_server, ADMIN_NAME, ADMIN_PASSWORD, USER_NAME, USER_PASSWORD};

#[tokio::test]
async fn only_server_admins_create_databases() {
    let server = secured_server("private");
    let user = common::login(&server, USER_NAME, USER_PASSWORD);
    let err = user.create("mine", false).await.unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));

    let anonymous = common::session(&server);
    let err = anonymous.create("mine", false).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));

    let admin = common::login(&server, ADMIN_NAME, ADMIN_PASSWORD);
    admin.create("mine", false).await.unwrap();
    assert_eq!(server.database_names(), vec!["mine", "private"]);
}

#[tokio::test]
async fn members_restrict_reads() {
    let server = secured_server("private");
    let admin = common::login(&server, ADMIN_NAME, ADMIN_PASSWORD);
    let user = common::login(&server, USER_NAME, USER_PASSWORD);

    // open to everybody until members are set
    user.database("private").await.unwrap();

    let db = admin.database("private").await.unwrap();
    let mut security = db.security().await.unwrap();
    security.add_member("elvis").unwrap();
    security.save().await.unwrap();

    match user.database("private").await {
        Err(ClientError::Forbidden(message)) => {
            assert_eq!(message, "Read privilege required for database 'private'")
        }
        other => panic!("unexpected result: {other:?}"),
    }
    let anonymous = common::session(&server);
    assert!(matches!(
        anonymous.database("private").await,
        Err(ClientError::Unauthorized(_))
    ));

    security.add_member_role("beatles").unwrap();
    security.save().await.unwrap();
    let db = user.database("private").await.unwrap();
    assert!(db.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn security_writes_need_an_admin() {
    let server = secured_server("private");
    let user = common::login(&server, USER_NAME, USER_PASSWORD);
    let db = user.database("private").await.unwrap();

    let mut security = db.security().await.unwrap();
    security.add_admin(USER_NAME).unwrap();
    match security.save().await {
        Err(ClientError::Forbidden(message)) => {
            assert_eq!(message, "You are not a database or server admin")
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(security.is_dirty());
}

#[tokio::test]
async fn database_admins_manage_design_documents() {
    let server = secured_server("private");
    let user = common::login(&server, USER_NAME, USER_PASSWORD);
    let db = user.database("private").await.unwrap();

    let mut ddoc = db.design_doc("queries", false).await.unwrap();
    let err = ddoc.save().await.unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));

    let admin = common::login(&server, ADMIN_NAME, ADMIN_PASSWORD);
    let mut security = admin.database("private").await.unwrap().security().await.unwrap();
    security.add_admin(USER_NAME).unwrap();
    security.save().await.unwrap();

    ddoc.save().await.unwrap();
    assert!(ddoc.rev().unwrap().starts_with("1-"));
}
