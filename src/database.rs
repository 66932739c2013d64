pub mod message;
pub mod postgres_repository;
pub mod session;
pub mod survey;
pub mod topic;
pub mod volunteer;
pub mod volunteer_session;

use message::MessageRepository;
use session::SessionRepository;
use survey::SurveyRepository;
use topic::TopicRepository;
use volunteer::VolunteerRepository;

/// Everything the help desk services need from storage.
pub trait HelpDeskRepository: SessionRepository + MessageRepository + VolunteerRepository + SurveyRepository + TopicRepository + Clone + 'static {}

impl<T> HelpDeskRepository for T where T: SessionRepository + MessageRepository + VolunteerRepository + SurveyRepository + TopicRepository + Clone + 'static {}
