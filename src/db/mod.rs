pub mod department;
pub mod history;
pub mod message;
pub mod ticket;
pub mod user;

use async_trait::async_trait;

use crate::{
    config,
    core::{
        self, audit, search,
        store::{Directory, Store},
    },
};

use tokio_postgres::{tls::NoTlsStream, NoTls, Socket};

pub use tokio_postgres::Error;

pub use self::{
    department::Department, message::Message, ticket::Ticket, user::User,
};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

pub async fn connect(
    config: config::Db,
) -> Result<(Client, Connection), Error> {
    tokio_postgres::connect(&config.url, NoTls)
        .await
        .map(|(client, connection)| (Client(client), connection))
}

pub struct Client(tokio_postgres::Client);

#[async_trait]
impl Directory for Client {
    async fn user(
        &self,
        id: user::Id,
    ) -> Result<Option<User>, core::Error> {
        Ok(self.get_user_by_id(id).await?)
    }

    async fn department(
        &self,
        id: department::Id,
    ) -> Result<Option<Department>, core::Error> {
        Ok(self.get_department_by_id(id).await?)
    }
}

#[async_trait]
impl Store for Client {
    async fn ticket(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, core::Error> {
        Ok(self.get_ticket_by_id(id).await?)
    }

    async fn insert_ticket(
        &self,
        ticket: &Ticket,
        entry: &audit::Record,
    ) -> Result<(), core::Error> {
        Ok(self.write_new_ticket(ticket, entry).await?)
    }

    async fn commit_ticket(
        &self,
        expected: &Ticket,
        updated: &Ticket,
        entry: &audit::Record,
    ) -> Result<(), core::Error> {
        if self
            .write_ticket_update(expected.revision, updated, entry)
            .await?
        {
            Ok(())
        } else {
            Err(core::Error::Conflict)
        }
    }

    async fn search_tickets(
        &self,
        filter: &search::Filter,
    ) -> Result<Vec<Ticket>, core::Error> {
        Ok(self.find_tickets(filter).await?)
    }

    async fn next_open_ticket(
        &self,
        departments: &[department::Id],
    ) -> Result<Option<Ticket>, core::Error> {
        Ok(self.get_next_open_ticket(departments).await?)
    }

    async fn ticket_history(
        &self,
        ticket: ticket::Id,
    ) -> Result<Vec<history::Entry>, core::Error> {
        Ok(self.get_ticket_history(ticket).await?)
    }
}
