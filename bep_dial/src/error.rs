use std::io;

use bep_util::device::DeviceId;

error_chain! {
    types {
        DialError, DialErrorKind, DialResultExt, DialResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        Timeout {
            description("Connection Attempt Timed Out")
            display("Connection Attempt Timed Out")
        }
        TlsFailure {
            cause: String
        } {
            description("Tls Handshake Failed")
            display("Tls Handshake Failed: {}", cause)
        }
        MissingDeviceId {
            description("Peer Presented No Certificate To Derive A Device Id From")
            display("Peer Presented No Certificate To Derive A Device Id From")
        }
        WrongDeviceId {
            expected: DeviceId,
            actual: DeviceId
        } {
            description("Peer Certificate Resolves To A Different Device Id")
            display("Expected Device {:?} But Peer Certificate Resolves To {:?}", expected, actual)
        }
        RelayFailure {
            detail: String
        } {
            description("Relay Rejected Or Broke The Session")
            display("Relay Rejected Or Broke The Session: {}", detail)
        }
        UnparsableUri {
            uri: String
        } {
            description("Uri Cannot Be Used For Dialing")
            display("Uri {:?} Cannot Be Used For Dialing", uri)
        }
        ConnectionImpossible {
            description("Every Dialable Uri Was Exhausted")
            display("Every Dialable Uri Was Exhausted")
        }
    }
}
